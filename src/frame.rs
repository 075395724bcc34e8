//! Frame phases and callback registration.
//!
//! The surrounding engine owns a [`FrameDriver`] and calls
//! [`run_phase`](FrameDriver::run_phase) at fixed points of its frame:
//!
//! ```text
//!  BeforeFrame ──► BeforeRenderPasses ──► (engine renders) ──► AfterFrame
//! ```
//!
//! Subscribers are closures over a shared context `C`. Within a phase they
//! run in registration order.

use smallvec::SmallVec;

use crate::errors::Result;

/// Point of the frame a callback runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FramePhase {
    /// Before the engine starts its frame; expensive work may open
    /// standalone frames here.
    BeforeFrame,
    /// After scene update, right before the compositor runs.
    BeforeRenderPasses,
    /// After the frame was submitted.
    AfterFrame,
}

impl FramePhase {
    /// Every phase, in execution order.
    pub const ALL: [Self; 3] = [Self::BeforeFrame, Self::BeforeRenderPasses, Self::AfterFrame];
}

/// Identifies one registration for [`FrameDriver::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u32);

type PhaseCallback<C> = Box<dyn FnMut(&mut C) -> Result<()>>;

struct Subscription<C> {
    id: SubscriptionId,
    phase: FramePhase,
    callback: PhaseCallback<C>,
}

/// Ordered set of phase callbacks over a context `C`.
pub struct FrameDriver<C> {
    subscriptions: SmallVec<[Subscription<C>; 8]>,
    next_id: u32,
}

impl<C> Default for FrameDriver<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> FrameDriver<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: SmallVec::new(),
            next_id: 0,
        }
    }

    /// Registers `callback` for `phase`.
    pub fn subscribe<F>(&mut self, phase: FramePhase, callback: F) -> SubscriptionId
    where
        F: FnMut(&mut C) -> Result<()> + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.subscriptions.push(Subscription {
            id,
            phase,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes a registration. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Runs the callbacks of `phase` in registration order, stopping at
    /// the first error.
    pub fn run_phase(&mut self, phase: FramePhase, context: &mut C) -> Result<()> {
        for subscription in self.subscriptions.iter_mut().filter(|s| s.phase == phase) {
            (subscription.callback)(context)?;
        }
        Ok(())
    }

    /// Runs every phase once.
    pub fn run_frame(&mut self, context: &mut C) -> Result<()> {
        for phase in FramePhase::ALL {
            self.run_phase(phase, context)?;
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

// ─── Compositor pass hook ──────────────────────────────────────────────────

/// Kind of compositor pass about to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Scene,
    Quad,
    Other,
}

/// Pass about to execute, as reported by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassInfo {
    pub kind: PassKind,
    /// User identifier set on the pass definition.
    pub identifier: u32,
}

impl PassInfo {
    #[must_use]
    pub const fn new(kind: PassKind, identifier: u32) -> Self {
        Self { kind, identifier }
    }
}
