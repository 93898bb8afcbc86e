use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// A registered resource: immutable metadata plus its own lock-guarded state.
#[derive(Debug)]
pub struct ResourceEntry {
    pub resource: Resource,
    pub state: RwLock<ResourceState>,
}

pub type SharedResource = Arc<ResourceEntry>;

impl ResourceEntry {
    pub fn expect_kind(&self, expected: ResourceKind) -> Result<(), EngineError> {
        if self.resource.kind != expected {
            return Err(EngineError::WrongKind {
                id: self.resource.id.clone(),
                expected,
            });
        }
        Ok(())
    }
}

impl ResourceState {
    pub fn as_seat(&self, id: &str) -> Result<&SeatState, EngineError> {
        match self {
            ResourceState::Seat(seat) => Ok(seat),
            ResourceState::Timeline(_) => Err(wrong_kind(id, ResourceKind::Discrete)),
        }
    }

    pub fn as_seat_mut(&mut self, id: &str) -> Result<&mut SeatState, EngineError> {
        match self {
            ResourceState::Seat(seat) => Ok(seat),
            ResourceState::Timeline(_) => Err(wrong_kind(id, ResourceKind::Discrete)),
        }
    }

    pub fn as_timeline(&self, id: &str) -> Result<&Timeline, EngineError> {
        match self {
            ResourceState::Timeline(tl) => Ok(tl),
            ResourceState::Seat(_) => Err(wrong_kind(id, ResourceKind::TimeRanged)),
        }
    }

    pub fn as_timeline_mut(&mut self, id: &str) -> Result<&mut Timeline, EngineError> {
        match self {
            ResourceState::Timeline(tl) => Ok(tl),
            ResourceState::Seat(_) => Err(wrong_kind(id, ResourceKind::TimeRanged)),
        }
    }
}

fn wrong_kind(id: &str, expected: ResourceKind) -> EngineError {
    EngineError::WrongKind {
        id: id.to_string(),
        expected,
    }
}

/// Resource id → resource. Read-mostly after startup; each entry carries
/// its own lock so operations on different resources never contend.
#[derive(Debug, Default)]
pub struct Registry {
    resources: DashMap<ResourceId, SharedResource>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, resource: Resource) -> Result<SharedResource, EngineError> {
        if resource.id.is_empty() {
            return Err(EngineError::InvalidArgument("resource id must not be empty"));
        }
        if resource.id.len() > MAX_ID_LEN {
            return Err(EngineError::LimitExceeded("resource id too long"));
        }
        if let Some(ref n) = resource.name
            && n.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("resource name too long"));
            }
        if resource.base_rate < 0 {
            return Err(EngineError::NegativePrice(resource.base_rate));
        }
        if self.resources.len() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }

        match self.resources.entry(resource.id.clone()) {
            Entry::Occupied(_) => Err(EngineError::DuplicateResource(resource.id)),
            Entry::Vacant(slot) => {
                let entry = Arc::new(ResourceEntry {
                    state: RwLock::new(ResourceState::for_kind(resource.kind)),
                    resource,
                });
                slot.insert(entry.clone());
                Ok(entry)
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<SharedResource, EngineError> {
        self.resources
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::ResourceNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Snapshot of all entries. Callers lock entries only after the map
    /// references are dropped.
    pub fn entries(&self) -> Vec<SharedResource> {
        self.resources.iter().map(|e| e.value().clone()).collect()
    }

    /// HELD → AVAILABLE for `token`, under the seat's write lock.
    /// Returns false when the token no longer matches.
    pub async fn release_hold(
        &self,
        seat_id: &str,
        holder: &str,
        token: HoldToken,
    ) -> Result<bool, EngineError> {
        let entry = self.get(seat_id)?;
        let mut guard = entry.state.write().await;
        let seat = guard.as_seat_mut(seat_id)?;
        Ok(seat.release_hold(holder, token))
    }
}
