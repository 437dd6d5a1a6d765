//! Per-symbol setup registry

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::lifecycle::{advance_setup, expire_at_session_end, merge_status, StatusTransition};
use super::viability::{has_progression_conflict, has_valid_geometry};
use crate::common::types::{Setup, SetupStatus};

/// Setups for one symbol, keyed by id
///
/// Retired ids keep their terminal status until the session ends, so a late
/// copy from the detector cannot bring a finished setup back.
#[derive(Debug, Default)]
pub struct SetupRegistry {
    setups: HashMap<String, Setup>,
    retired: HashMap<String, SetupStatus>,
}

/// Valid geometry, not terminal, and not already past target1
fn is_presentable(setup: &Setup, price: Option<f64>) -> bool {
    !setup.status.is_terminal()
        && has_valid_geometry(setup)
        && price.map_or(true, |p| !has_progression_conflict(setup, p))
}

impl SetupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.setups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setups.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Setup> {
        self.setups.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Setup> {
        self.setups.get_mut(id)
    }

    /// The setup, unless it is withheld from presentation at `price`
    pub fn get_presentable(&self, id: &str, price: Option<f64>) -> Option<&Setup> {
        self.setups.get(id).filter(|s| is_presentable(s, price))
    }

    /// Terminal status of a setup retired this session
    pub fn retired_status(&self, id: &str) -> Option<SetupStatus> {
        self.retired.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Setup> {
        self.setups.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Setup> {
        self.setups.values_mut()
    }

    /// Insert or replace a setup, never letting its status regress
    ///
    /// Returns the stored setup, or `None` when the id was already retired
    /// this session and the copy is ignored.
    pub fn upsert(&mut self, mut incoming: Setup) -> Option<&Setup> {
        if let Some(status) = self.retired.get(&incoming.id) {
            debug!(
                setup_id = %incoming.id,
                retired = %status,
                dropped = %incoming.status,
                "Ignoring update for retired setup"
            );
            return None;
        }
        if let Some(existing) = self.setups.get(&incoming.id) {
            let merged = merge_status(existing.status, incoming.status);
            if merged != incoming.status {
                debug!(
                    setup_id = %incoming.id,
                    kept = %merged,
                    dropped = %incoming.status,
                    "Ignoring status regression"
                );
                incoming.status = merged;
                incoming.triggered_at = existing.triggered_at.or(incoming.triggered_at);
                incoming.status_updated_at = existing.status_updated_at;
            }
        }
        let id = incoming.id.clone();
        self.setups.insert(id.clone(), incoming);
        self.setups.get(&id)
    }

    /// Run the lifecycle for every setup against the latest price
    pub fn advance(&mut self, price: Option<f64>, now: DateTime<Utc>) -> Vec<StatusTransition> {
        self.setups
            .values_mut()
            .flat_map(|setup| advance_setup(setup, price, now))
            .collect()
    }

    /// Drop terminal setups, returning them
    ///
    /// Their ids are remembered until [`SetupRegistry::session_end`].
    pub fn retire_terminal(&mut self) -> Vec<Setup> {
        let ids: Vec<String> = self
            .setups
            .values()
            .filter(|s| s.status.is_terminal())
            .map(|s| s.id.clone())
            .collect();

        let retired: Vec<Setup> = ids
            .iter()
            .filter_map(|id| self.setups.remove(id))
            .collect();
        for setup in &retired {
            self.retired.insert(setup.id.clone(), setup.status);
        }
        retired
    }

    /// Expire everything still open and clear the registry
    pub fn session_end(&mut self, now: DateTime<Utc>) -> Vec<StatusTransition> {
        let transitions: Vec<StatusTransition> = self
            .setups
            .values_mut()
            .filter_map(|setup| expire_at_session_end(setup, now))
            .collect();
        info!(expired = transitions.len(), "Session closed");
        self.setups.clear();
        self.retired.clear();
        transitions
    }

    /// Setups safe to show: valid geometry and no progression conflict
    pub fn presentable(&self, price: Option<f64>) -> Vec<&Setup> {
        let mut out: Vec<&Setup> = self
            .setups
            .values()
            .filter(|s| is_presentable(s, price))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Ready or triggered setups that are presentable at `price`
    pub fn actionable(&self, price: Option<f64>) -> Vec<&Setup> {
        let mut out: Vec<&Setup> = self
            .setups
            .values()
            .filter(|s| s.status.is_actionable() && is_presentable(s, price))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
