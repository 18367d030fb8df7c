//! Alert rule configuration.
//!
//! Rules are stored and listed only. Nothing in this crate evaluates them
//! against incoming data; notification delivery belongs to another service.

use crate::error::{DashboardError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    #[default]
    ErrorCount,
    LogVolume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    #[default]
    Gt,
    Lt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub metric: AlertMetric,
    pub condition: Comparator,
    /// Per-minute threshold.
    pub threshold: u64,
    pub email: String,
}

impl AlertRule {
    /// `Errors > 10 / min`
    pub fn describe(&self) -> String {
        let metric = match self.metric {
            AlertMetric::ErrorCount => "Errors",
            AlertMetric::LogVolume => "Logs",
        };
        let op = match self.condition {
            Comparator::Gt => ">",
            Comparator::Lt => "<",
        };
        format!("{} {} {} / min", metric, op, self.threshold)
    }
}

/// Request body for creating a rule. Omitted fields take the form defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewAlertRule {
    pub metric: AlertMetric,
    pub condition: Comparator,
    pub threshold: u64,
    pub email: String,
}

impl Default for NewAlertRule {
    fn default() -> Self {
        Self {
            metric: AlertMetric::ErrorCount,
            condition: Comparator::Gt,
            threshold: 10,
            email: String::new(),
        }
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// In-memory rule list, kept in insertion order.
#[derive(Debug, Default)]
pub struct AlertStore {
    rules: Mutex<Vec<AlertRule>>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, new_rule: NewAlertRule) -> Result<AlertRule> {
        let email = new_rule.email.trim();
        if email.is_empty() {
            return Err(DashboardError::InvalidAlert("email is required".to_string()));
        }
        if !looks_like_email(email) {
            return Err(DashboardError::InvalidAlert(format!(
                "'{}' is not an email address",
                email
            )));
        }
        let rule = AlertRule {
            id: Uuid::new_v4(),
            metric: new_rule.metric,
            condition: new_rule.condition,
            threshold: new_rule.threshold,
            email: email.to_string(),
        };
        info!(id = %rule.id, rule = %rule.describe(), "Alert rule added");
        self.lock().push(rule.clone());
        Ok(rule)
    }

    /// Remove a rule; returns whether it existed.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut rules = self.lock();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        before != rules.len()
    }

    pub fn list(&self) -> Vec<AlertRule> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AlertRule>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.rules.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
