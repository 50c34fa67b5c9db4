// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Named simulation entities.
//!
//! Nodes, links, devices, generators and sinks each own an [`Entity`]. The
//! names form a tree rooted at the engine's top-level entity, so a generator
//! on node 3 sending to node 7 is `top::node3::gen3->7`.

use std::fmt;
use std::rc::Rc;

use crate::{Id, Tracker, create, destroy};

static JOIN: &str = "::";

pub struct Entity {
    pub name: String,

    /// Only the top-level entity has no parent.
    pub parent: Option<Rc<Entity>>,

    pub id: Id,

    /// Receives every log and trace event of this entity.
    pub tracker: Tracker,

    full_name: String,
}

impl Entity {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let full_name = format!("{}{JOIN}{name}", parent.full_name);
        let tracker = parent.tracker.clone();
        let id = tracker.unique_id();
        tracker.add_entity(id, &full_name);

        let entity = Self {
            name: String::from(name),
            parent: Some(parent.clone()),
            id,
            tracker,
            full_name,
        };
        create!(entity);
        entity
    }

    /// The `::` separated path from the top-level entity.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.full_name.clone()
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        destroy!(self);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("full_name", &self.full_name)
            .field("id", &self.id)
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// Create the root of an entity tree.
pub fn toplevel(tracker: &Tracker, name: &str) -> Rc<Entity> {
    let id = tracker.unique_id();
    tracker.add_entity(id, name);
    let top = Rc::new(Entity {
        name: String::from(name),
        parent: None,
        id,
        tracker: tracker.clone(),
        full_name: String::from(name),
    });
    create!(top);
    top
}

/// Anything that owns an [`Entity`].
pub trait GetEntity {
    fn entity(&self) -> &Rc<Entity>;
}
