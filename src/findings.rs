//! Security findings raised by processors against fuzz results
#![allow(clippy::use_self)] // clippy false-positive on Risk/Confidence, doesn't want to apply directly to the enums that derive Serialize
use crate::history::HistoryId;

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// how bad a finding is
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Risk {
    /// informational, risk code 0
    #[default]
    Informational,

    /// low, risk code 1
    Low,

    /// medium, risk code 2
    Medium,

    /// high, risk code 3
    High,
}

/// how sure the raiser is that the finding is real
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Confidence {
    /// known false positive, confidence code 0
    FalsePositive,

    /// confidence code 1
    Low,

    /// confidence code 2
    #[default]
    Medium,

    /// confidence code 3
    High,

    /// manually confirmed, confidence code 4
    Confirmed,
}

/// a finding attached to a fuzz result
///
/// # Examples
///
/// ```
/// # use locfuzz::findings::{Alert, Confidence, Risk};
/// let alert = Alert::new(Risk::High, Confidence::Medium, "Reflected payload")
///     .with_rule_id(40012)
///     .with_param("q")
///     .with_evidence("<script>alert(1)</script>");
///
/// assert_eq!(alert.key(), alert.clone().with_description("ignored by the key").key());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Alert {
    /// identifier of the rule/plugin that raised the finding
    pub rule_id: i32,

    /// short name
    pub name: String,

    /// longer description
    pub description: String,

    /// url of the message the finding was raised on
    pub url: String,

    /// method of the message the finding was raised on
    pub method: String,

    /// the attack string that triggered the finding
    pub attack: String,

    /// the parameter that was attacked
    pub param: String,

    /// evidence of the finding in the response
    pub evidence: String,

    /// anything else worth knowing
    pub other_info: String,

    /// severity
    pub risk: Risk,

    /// certainty
    pub confidence: Confidence,

    /// persisted message backing the finding, set when the alert is raised
    pub history_id: Option<HistoryId>,
}

impl Alert {
    /// create an alert with the three mandatory fields; everything else starts empty
    #[must_use]
    pub fn new(risk: Risk, confidence: Confidence, name: &str) -> Self {
        Self {
            name: name.to_string(),
            risk,
            confidence,
            ..Self::default()
        }
    }

    /// builder-style setter for [`Alert::rule_id`]
    #[must_use]
    pub const fn with_rule_id(mut self, rule_id: i32) -> Self {
        self.rule_id = rule_id;
        self
    }

    /// builder-style setter for [`Alert::description`]
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// builder-style setter for [`Alert::attack`]
    #[must_use]
    pub fn with_attack(mut self, attack: &str) -> Self {
        self.attack = attack.to_string();
        self
    }

    /// builder-style setter for [`Alert::param`]
    #[must_use]
    pub fn with_param(mut self, param: &str) -> Self {
        self.param = param.to_string();
        self
    }

    /// builder-style setter for [`Alert::evidence`]
    #[must_use]
    pub fn with_evidence(mut self, evidence: &str) -> Self {
        self.evidence = evidence.to_string();
        self
    }

    /// builder-style setter for [`Alert::other_info`]
    #[must_use]
    pub fn with_other_info(mut self, other_info: &str) -> Self {
        self.other_info = other_info.to_string();
        self
    }

    /// the identity of this finding
    ///
    /// two alerts with equal keys describe the same finding, regardless of
    /// description or backing message
    #[must_use]
    pub fn key(&self) -> AlertKey {
        AlertKey {
            rule_id: self.rule_id,
            name: self.name.clone(),
            url: self.url.clone(),
            method: self.method.clone(),
            attack: self.attack.clone(),
            param: self.param.clone(),
            evidence: self.evidence.clone(),
            confidence: self.confidence,
            risk: self.risk,
            other_info: self.other_info.clone(),
        }
    }
}

impl Display for Alert {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}/{:?}] {} {} {}",
            self.risk, self.confidence, self.name, self.method, self.url
        )
    }
}

/// de-duplication key of an [`Alert`]: equality on all ten fields means
/// "same finding"
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlertKey {
    rule_id: i32,
    name: String,
    url: String,
    method: String,
    attack: String,
    param: String,
    evidence: String,
    confidence: Confidence,
    risk: Risk,
    other_info: String,
}

/// every alert raised during a session, in the order raised, with the set of
/// distinct findings alongside
#[derive(Clone, Debug, Default)]
pub struct Findings {
    alerts: Vec<Alert>,
    seen: HashSet<AlertKey>,
}

impl Findings {
    /// record an alert; returns `false` when an alert with the same key was
    /// already recorded (the alert is still kept)
    pub fn record(&mut self, alert: Alert) -> bool {
        let is_new = self.seen.insert(alert.key());
        self.alerts.push(alert);
        is_new
    }

    /// all recorded alerts
    #[must_use]
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// number of distinct findings
    #[must_use]
    pub fn unique_count(&self) -> usize {
        self.seen.len()
    }

    /// `true` when an alert matching `alert`'s key was recorded
    #[must_use]
    pub fn contains(&self, alert: &Alert) -> bool {
        self.seen.contains(&alert.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// every one of the ten key fields participates in the identity
    #[test]
    fn alert_key_uses_all_ten_fields() {
        let base = Alert::new(Risk::Medium, Confidence::High, "name")
            .with_rule_id(1)
            .with_attack("attack")
            .with_param("param")
            .with_evidence("evidence")
            .with_other_info("other");

        let variants = [
            base.clone().with_rule_id(2),
            Alert {
                name: String::from("other name"),
                ..base.clone()
            },
            Alert {
                url: String::from("http://other"),
                ..base.clone()
            },
            Alert {
                method: String::from("POST"),
                ..base.clone()
            },
            base.clone().with_attack("x"),
            base.clone().with_param("x"),
            base.clone().with_evidence("x"),
            Alert {
                confidence: Confidence::Low,
                ..base.clone()
            },
            Alert {
                risk: Risk::High,
                ..base.clone()
            },
            base.clone().with_other_info("x"),
        ];

        for variant in &variants {
            assert_ne!(variant.key(), base.key());
        }

        let same = base
            .clone()
            .with_description("description isn't part of the key");
        assert_eq!(same.key(), base.key());
    }

    /// duplicates are kept but only counted once
    #[test]
    fn findings_track_distinct_alerts() {
        let mut findings = Findings::default();
        let alert = Alert::new(Risk::Low, Confidence::Low, "dup");

        assert!(findings.record(alert.clone()));
        assert!(!findings.record(alert.clone()));
        assert!(findings.contains(&alert));
        assert_eq!(findings.alerts().len(), 2);
        assert_eq!(findings.unique_count(), 1);
    }
}
