//! Current-world tracking and leave suppression.
//!
//! When the local actor leaves a world, the upstream log prints a leave line
//! for the local actor followed by leave lines for everyone who was in the
//! old instance. None of those are real departures, so once the local
//! actor's own leave is seen every leave is swallowed until the next world
//! is entered.

use serde::Serialize;
use tracing::debug;

use super::event::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionState {
    Stable,
    Transitioning,
}

/// Where the local actor currently is, as far as the log says.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorldContext {
    pub world_name: Option<String>,
    pub world_id: Option<String>,
    pub instance_id: Option<String>,
    pub region: Option<String>,
    pub in_transition: bool,
}

impl WorldContext {
    pub fn is_known(&self) -> bool {
        self.world_name.is_some() || self.world_id.is_some()
    }
}

/// Two-state machine over [`EventKind`]s.
#[derive(Debug, Clone, Default)]
pub struct WorldTracker {
    context: WorldContext,
    /// `None` until the auth collaborator tells us who we are; suppression
    /// never triggers before that.
    local_actor: Option<String>,
}

impl WorldTracker {
    pub fn new(local_actor: Option<String>) -> Self {
        Self {
            context: WorldContext::default(),
            local_actor,
        }
    }

    pub fn set_local_actor(&mut self, local_actor: Option<String>) {
        self.local_actor = local_actor;
    }

    pub fn local_actor(&self) -> Option<&str> {
        self.local_actor.as_deref()
    }

    pub fn context(&self) -> &WorldContext {
        &self.context
    }

    pub fn state(&self) -> TransitionState {
        if self.context.in_transition {
            TransitionState::Transitioning
        } else {
            TransitionState::Stable
        }
    }

    /// Forget the current world. Used on file switch and truncation.
    pub fn reset(&mut self) {
        self.context = WorldContext::default();
    }

    /// Feed one classified event. Returns the event if it should be
    /// forwarded, `None` if it was suppressed.
    pub fn observe(&mut self, event: EventKind) -> Option<EventKind> {
        match &event {
            EventKind::WorldEnter { world_name } => {
                self.context.world_name = Some(world_name.clone());
                self.context.in_transition = false;
                Some(event)
            }
            EventKind::InstanceJoin {
                world_id,
                instance_id,
                region,
            } => {
                self.context.world_id = Some(world_id.clone());
                self.context.instance_id = Some(instance_id.clone());
                self.context.region = region.clone();
                Some(event)
            }
            EventKind::PlayerJoin { .. } => Some(event),
            EventKind::PlayerLeave {
                display_name,
                user_id,
            } => {
                if self.local_actor.as_deref() == Some(display_name.as_str()) {
                    debug!("Local actor left, suppressing leaves until next world");
                    self.context.in_transition = true;
                    None
                } else if self.context.in_transition {
                    debug!(%user_id, "Suppressed leave during world transition");
                    None
                } else {
                    Some(event)
                }
            }
        }
    }

    /// Apply a historical event to the context without reporting anything.
    pub(crate) fn restore(&mut self, event: &EventKind) {
        match event {
            EventKind::WorldEnter { world_name } => {
                self.context.world_name = Some(world_name.clone());
            }
            EventKind::InstanceJoin {
                world_id,
                instance_id,
                region,
            } => {
                self.context.world_id = Some(world_id.clone());
                self.context.instance_id = Some(instance_id.clone());
                self.context.region = region.clone();
            }
            EventKind::PlayerJoin { .. } | EventKind::PlayerLeave { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enter(name: &str) -> EventKind {
        EventKind::WorldEnter {
            world_name: name.to_string(),
        }
    }

    fn join(id: &str, name: &str) -> EventKind {
        EventKind::PlayerJoin {
            user_id: id.to_string(),
            display_name: name.to_string(),
        }
    }

    fn leave(id: &str, name: &str) -> EventKind {
        EventKind::PlayerLeave {
            user_id: id.to_string(),
            display_name: name.to_string(),
        }
    }

    #[test]
    fn suppresses_leaves_during_transition() {
        let mut tracker = WorldTracker::new(Some("Me".to_string()));
        let sequence = vec![
            enter("A"),
            join("usr_u1", "U1"),
            leave("usr_me", "Me"),
            leave("usr_u2", "U2"),
            enter("B"),
            leave("usr_u3", "U3"),
        ];

        let leaves: Vec<EventKind> = sequence
            .into_iter()
            .filter_map(|e| tracker.observe(e))
            .filter(|e| matches!(e, EventKind::PlayerLeave { .. }))
            .collect();

        assert_eq!(leaves, vec![leave("usr_u3", "U3")]);
        assert_eq!(tracker.state(), TransitionState::Stable);
        assert_eq!(tracker.context().world_name.as_deref(), Some("B"));
    }

    #[test]
    fn joins_pass_while_transitioning() {
        let mut tracker = WorldTracker::new(Some("Me".to_string()));
        tracker.observe(enter("A"));
        assert_eq!(tracker.observe(leave("usr_me", "Me")), None);
        assert_eq!(tracker.state(), TransitionState::Transitioning);
        assert_eq!(
            tracker.observe(join("usr_u1", "U1")),
            Some(join("usr_u1", "U1"))
        );
        assert_eq!(tracker.state(), TransitionState::Transitioning);
    }

    #[test]
    fn unknown_local_actor_never_suppresses() {
        let mut tracker = WorldTracker::default();
        tracker.observe(enter("A"));
        assert!(tracker.observe(leave("usr_me", "Me")).is_some());
        assert!(tracker.observe(leave("usr_u2", "U2")).is_some());
        assert_eq!(tracker.state(), TransitionState::Stable);

        tracker.set_local_actor(Some("Me".to_string()));
        assert!(tracker.observe(leave("usr_me", "Me")).is_none());
    }

    #[test]
    fn instance_join_updates_context_only() {
        let mut tracker = WorldTracker::new(Some("Me".to_string()));
        tracker.observe(leave("usr_me", "Me"));
        tracker.observe(EventKind::InstanceJoin {
            world_id: "wrld_1".to_string(),
            instance_id: "777".to_string(),
            region: Some("eu".to_string()),
        });

        let ctx = tracker.context();
        assert_eq!(ctx.world_id.as_deref(), Some("wrld_1"));
        assert_eq!(ctx.instance_id.as_deref(), Some("777"));
        assert_eq!(ctx.region.as_deref(), Some("eu"));
        assert!(ctx.in_transition);
    }

    #[test]
    fn reset_clears_context() {
        let mut tracker = WorldTracker::new(Some("Me".to_string()));
        tracker.observe(enter("A"));
        tracker.observe(leave("usr_me", "Me"));
        tracker.reset();

        assert_eq!(tracker.context(), &WorldContext::default());
        assert_eq!(tracker.state(), TransitionState::Stable);
        assert_eq!(tracker.local_actor(), Some("Me"));
    }
}
