// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::Id;
use crate::tracker::{EntityManager, Track};

/// A [`Track`] event.
#[derive(Debug, Clone)]
pub struct EventCommon {
    /// The [`Id`] of the event originator.
    pub id: Id,

    /// The time at which the event occurred.
    pub time_ns: f64,

    /// Any event-specific state.
    pub event: Event,
}

/// The events kept by the [`InMemoryTracker`].
#[derive(Debug, Clone)]
pub enum Event {
    /// An object was created.
    Create {
        /// The created object.
        created: Id,
        /// Size of the created object.
        num_bytes: usize,
    },
    /// An object was destroyed.
    Destroy,
    /// A log message.
    Log {
        /// Level the message was emitted at.
        level: log::Level,
        /// Formatted message.
        text: String,
    },
    /// An object entered the entity.
    Enter {
        /// The object entering.
        entered: Id,
    },
    /// An object left the entity.
    Exit {
        /// The object leaving.
        exited: Id,
    },
}

#[derive(Default)]
struct TrackedState {
    events: Vec<EventCommon>,
    id_to_num_bytes: HashMap<Id, usize>,
    name_to_id: HashMap<String, Id>,
}

impl TrackedState {
    fn count_where(&self, id: Id, matches: impl Fn(&Event) -> bool) -> usize {
        self.events
            .iter()
            .filter(|e| e.id == id)
            .filter(|e| matches(&e.event))
            .count()
    }

    fn bytes_entered(&self, id: Id) -> usize {
        self.events
            .iter()
            .filter(|e| e.id == id)
            .filter_map(|e| match e.event {
                Event::Enter { entered } => self.id_to_num_bytes.get(&entered).copied(),
                _ => None,
            })
            .sum()
    }
}

/// A tracker that keeps all events in memory so that they can be queried
/// once a simulation has completed.
pub struct InMemoryTracker {
    entity_manager: EntityManager,
    state: RefCell<TrackedState>,
}

impl InMemoryTracker {
    /// Create a new [`InMemoryTracker`] with an [`EntityManager`].
    #[must_use]
    pub fn new(entity_manager: EntityManager) -> Self {
        Self {
            entity_manager,
            state: RefCell::new(TrackedState::default()),
        }
    }

    fn add_event(&self, id: Id, event: Event) {
        let time_ns = self.entity_manager.time();
        self.state
            .borrow_mut()
            .events
            .push(EventCommon { id, time_ns, event });
    }

    /// Get the [`Id`] for the specified simulation entity.
    #[must_use]
    pub fn id_for_name(&self, name: &str) -> Option<Id> {
        self.state.borrow().name_to_id.get(name).copied()
    }

    /// Return the number of objects that entered the entity specified by `id`.
    #[must_use]
    pub fn count_enter(&self, id: Id) -> usize {
        self.state
            .borrow()
            .count_where(id, |e| matches!(e, Event::Enter { .. }))
    }

    /// Return the number of objects that exited the entity specified by `id`.
    #[must_use]
    pub fn count_exit(&self, id: Id) -> usize {
        self.state
            .borrow()
            .count_where(id, |e| matches!(e, Event::Exit { .. }))
    }

    /// Return the total size of all objects that entered the entity.
    ///
    /// Objects whose creation was not tracked do not contribute.
    #[must_use]
    pub fn bytes_entered(&self, id: Id) -> usize {
        self.state.borrow().bytes_entered(id)
    }

    /// Return the times (in ns) at which objects exited the entity.
    #[must_use]
    pub fn exit_times_ns(&self, id: Id) -> Vec<f64> {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| e.id == id && matches!(e.event, Event::Exit { .. }))
            .map(|e| e.time_ns)
            .collect()
    }

    /// Return all log messages emitted by the entity at `level` or above.
    #[must_use]
    pub fn logs(&self, id: Id, level: log::Level) -> Vec<String> {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| e.id == id)
            .filter_map(|e| match &e.event {
                Event::Log { level: l, text } if *l <= level => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Track for InMemoryTracker {
    fn unique_id(&self) -> Id {
        self.entity_manager.unique_id()
    }

    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool {
        self.entity_manager.is_log_enabled_at_level(id, level)
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        self.entity_manager.add_entity(id, entity_name);
        self.state
            .borrow_mut()
            .name_to_id
            .insert(entity_name.to_owned(), id);
    }

    fn enter(&self, id: Id, object: Id) {
        self.add_event(id, Event::Enter { entered: object });
    }

    fn exit(&self, id: Id, object: Id) {
        self.add_event(id, Event::Exit { exited: object });
    }

    fn create(&self, created_by: Id, id: Id, num_bytes: usize, _name: &str) {
        self.state.borrow_mut().id_to_num_bytes.insert(id, num_bytes);
        self.add_event(
            created_by,
            Event::Create {
                created: id,
                num_bytes,
            },
        );
    }

    fn destroy(&self, _destroyed_by: Id, id: Id) {
        self.add_event(id, Event::Destroy);
    }

    fn log(&self, id: Id, level: log::Level, msg: std::fmt::Arguments) {
        self.add_event(
            id,
            Event::Log {
                level,
                text: format!("{msg}"),
            },
        );
    }

    fn time(&self, _set_by: Id, time_ns: f64) {
        self.entity_manager.set_time(time_ns);
    }

    fn shutdown(&self) {}
}
