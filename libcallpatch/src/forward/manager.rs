use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};

use super::{Forward, ForwardError, ForwardResult};

/// Registry of forwards sharing a payload type, keyed by name.
pub struct ForwardManager<P> {
    forwards: DashMap<String, Arc<Forward<P>>>,
}

impl<P> Default for ForwardManager<P> {
    fn default() -> Self {
        Self {
            forwards: DashMap::new(),
        }
    }
}

impl<P> ForwardManager<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_forward(&self, name: &str) -> ForwardResult<Arc<Forward<P>>> {
        if name.is_empty() {
            return Err(ForwardError::EmptyName);
        }

        match self.forwards.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ForwardError::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                let forward = Arc::new(Forward::new(name));
                slot.insert(forward.clone());

                log::debug!("Forward \"{}\" created", name);
                Ok(forward)
            }
        }
    }

    pub fn find_forward(&self, name: &str) -> Option<Arc<Forward<P>>> {
        self.forwards.get(name).map(|entry| entry.value().clone())
    }

    /// Drops the registry entry; handles already given out stay usable.
    pub fn release_forward(&self, name: &str) -> ForwardResult<()> {
        self.forwards
            .remove(name)
            .map(|_| log::debug!("Forward \"{}\" released", name))
            .ok_or_else(|| ForwardError::NotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.forwards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forwards.is_empty()
    }
}
