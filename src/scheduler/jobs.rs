//! Scheduled job model.
//!
//! A [`ScheduledJob`] pairs a [`Trigger`] (daily cron or fixed interval)
//! with the [`JobAction`] it runs.  On the wire (home server job list) a
//! job travels as a flat [`JobSpec`]:
//!
//! ```json
//! { "id": "short_cycle_fan", "trigger_kind": "cron",
//!   "trigger_params": { "hour": 15, "minute": 0 }, "locked": false }
//! ```
//!
//! `action` is optional on the wire; for the built-in ids it is inferred.

use core::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SystemConfig;
use crate::devices::CycleGroup;

/// Job ids reconciliation never removes or replaces.
pub const LOCKED_JOBS: [&str; 2] = [PHONE_HOME, BROADCAST_LOCATION];

pub const PHONE_HOME: &str = "phone_home";
pub const BROADCAST_LOCATION: &str = "broadcast_location";

// ═══════════════════════════════════════════════════════════════
//  Triggers and actions
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every day at `hour:minute` local time.
    Cron { hour: u8, minute: u8 },
    /// Every `seconds`, first fire one full period after install.
    Interval { seconds: u32 },
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron { hour, minute } => write!(f, "daily {:02}:{:02}", hour, minute),
            Self::Interval { seconds } => write!(f, "every {}s", seconds),
        }
    }
}

/// Hold length of a cleaning cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleLength {
    Long,
    Short,
}

impl CycleLength {
    pub fn hold(self, cfg: &SystemConfig) -> Duration {
        let secs = match self {
            Self::Long => cfg.long_cycle_sleep,
            Self::Short => cfg.short_cycle_sleep,
        };
        Duration::from_secs(u64::from(secs))
    }
}

/// What a job does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobAction {
    Cycle { group: CycleGroup, length: CycleLength },
    PhoneHome,
    BroadcastLocation,
}

impl JobAction {
    /// Action implied by one of the built-in job ids.
    pub fn infer(id: &str) -> Option<Self> {
        use CycleGroup::{Both, Fan, Light};
        use CycleLength::{Long, Short};

        let cycle = |group, length| Some(Self::Cycle { group, length });
        match id {
            "long_cycle_uvc" => cycle(Light, Long),
            "short_cycle_uvc" => cycle(Light, Short),
            "long_cycle_fan" => cycle(Fan, Long),
            "short_cycle_fan" => cycle(Fan, Short),
            "long_cycle_both" => cycle(Both, Long),
            "short_cycle_both" => cycle(Both, Short),
            PHONE_HOME => Some(Self::PhoneHome),
            BROADCAST_LOCATION => Some(Self::BroadcastLocation),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  ScheduledJob
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub id: String,
    pub trigger: Trigger,
    pub action: JobAction,
    /// Never removed or replaced by reconciliation.
    pub locked: bool,
}

impl ScheduledJob {
    pub fn cron(id: &str, hour: u8, minute: u8, action: JobAction) -> Self {
        Self {
            id: id.to_owned(),
            trigger: Trigger::Cron { hour, minute },
            action,
            locked: false,
        }
    }

    pub fn interval(id: &str, seconds: u32, action: JobAction) -> Self {
        Self {
            id: id.to_owned(),
            trigger: Trigger::Interval { seconds },
            action,
            locked: false,
        }
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Locked by flag or by being one of [`LOCKED_JOBS`].
    pub fn is_locked(&self) -> bool {
        self.locked || is_locked_id(&self.id)
    }
}

pub fn is_locked_id(id: &str) -> bool {
    LOCKED_JOBS.contains(&id)
}

/// The job table a fresh controller starts with.
pub fn default_jobs(cfg: &SystemConfig) -> Vec<ScheduledJob> {
    let job = |id: &str, hour, minute| {
        // Built-in ids always infer.
        JobAction::infer(id).map(|action| ScheduledJob::cron(id, hour, minute, action))
    };
    let mut jobs: Vec<ScheduledJob> = [
        job("long_cycle_uvc", cfg.long_cycle_uvc_hour, cfg.long_cycle_uvc_minute),
        job("short_cycle_uvc", cfg.short_cycle_uvc_hour, cfg.short_cycle_uvc_minute),
        job("long_cycle_fan", cfg.long_cycle_fan_hour, cfg.long_cycle_fan_minute),
        job("short_cycle_fan", cfg.short_cycle_fan_hour, cfg.short_cycle_fan_minute),
        job("long_cycle_both", cfg.long_cycle_both_hour, cfg.long_cycle_both_minute),
        job("short_cycle_both", cfg.short_cycle_both_hour, cfg.short_cycle_both_minute),
    ]
    .into_iter()
    .flatten()
    .collect();

    jobs.push(ScheduledJob::interval(PHONE_HOME, cfg.phone_home_sleep, JobAction::PhoneHome).locked());
    jobs.push(
        ScheduledJob::interval(BROADCAST_LOCATION, cfg.broadcast_sleep, JobAction::BroadcastLocation)
            .locked(),
    );
    jobs
}

// ═══════════════════════════════════════════════════════════════
//  Wire format
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Cron,
    Interval,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u32>,
}

/// A job as the home server lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub trigger_kind: TriggerKind,
    #[serde(default)]
    pub trigger_params: TriggerParams,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<JobAction>,
}

/// Why a [`JobSpec`] could not become a [`ScheduledJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSpecError {
    EmptyId,
    MissingParam(&'static str),
    OutOfRange(&'static str),
    /// No `action` given and none can be inferred from the id.
    UnknownAction,
}

impl fmt::Display for JobSpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId => write!(f, "empty job id"),
            Self::MissingParam(p) => write!(f, "missing trigger parameter '{}'", p),
            Self::OutOfRange(p) => write!(f, "trigger parameter '{}' out of range", p),
            Self::UnknownAction => write!(f, "no action given and none implied by the id"),
        }
    }
}

impl TryFrom<JobSpec> for ScheduledJob {
    type Error = JobSpecError;

    fn try_from(spec: JobSpec) -> Result<Self, Self::Error> {
        if spec.id.trim().is_empty() {
            return Err(JobSpecError::EmptyId);
        }
        let p = spec.trigger_params;
        let trigger = match spec.trigger_kind {
            TriggerKind::Cron => {
                let hour = p.hour.ok_or(JobSpecError::MissingParam("hour"))?;
                let minute = p.minute.unwrap_or(0);
                if hour > 23 {
                    return Err(JobSpecError::OutOfRange("hour"));
                }
                if minute > 59 {
                    return Err(JobSpecError::OutOfRange("minute"));
                }
                Trigger::Cron { hour, minute }
            }
            TriggerKind::Interval => {
                let seconds = p.seconds.ok_or(JobSpecError::MissingParam("seconds"))?;
                if seconds == 0 {
                    return Err(JobSpecError::OutOfRange("seconds"));
                }
                Trigger::Interval { seconds }
            }
        };
        let action = spec
            .action
            .or_else(|| JobAction::infer(&spec.id))
            .ok_or(JobSpecError::UnknownAction)?;
        Ok(Self {
            id: spec.id,
            trigger,
            action,
            locked: spec.locked,
        })
    }
}

impl From<&ScheduledJob> for JobSpec {
    fn from(job: &ScheduledJob) -> Self {
        let (trigger_kind, trigger_params) = match job.trigger {
            Trigger::Cron { hour, minute } => (
                TriggerKind::Cron,
                TriggerParams {
                    hour: Some(hour),
                    minute: Some(minute),
                    seconds: None,
                },
            ),
            Trigger::Interval { seconds } => (
                TriggerKind::Interval,
                TriggerParams {
                    seconds: Some(seconds),
                    ..TriggerParams::default()
                },
            ),
        };
        // Inferable actions stay implicit on the wire.
        let action = (JobAction::infer(&job.id) != Some(job.action)).then_some(job.action);
        Self {
            id: job.id.clone(),
            trigger_kind,
            trigger_params,
            locked: job.locked,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_all_builtins() {
        let jobs = default_jobs(&SystemConfig::default());
        assert_eq!(jobs.len(), 8);
        let locked: Vec<&str> = jobs.iter().filter(|j| j.is_locked()).map(|j| j.id.as_str()).collect();
        assert_eq!(locked, vec![PHONE_HOME, BROADCAST_LOCATION]);
    }

    #[test]
    fn default_cron_follows_config() {
        let mut cfg = SystemConfig::default();
        cfg.short_cycle_fan_hour = 9;
        cfg.short_cycle_fan_minute = 30;
        let jobs = default_jobs(&cfg);
        let fan = jobs.iter().find(|j| j.id == "short_cycle_fan").unwrap();
        assert_eq!(fan.trigger, Trigger::Cron { hour: 9, minute: 30 });
        assert_eq!(
            fan.action,
            JobAction::Cycle {
                group: CycleGroup::Fan,
                length: CycleLength::Short
            }
        );
    }

    #[test]
    fn spec_without_action_infers_builtin() {
        let spec: JobSpec = serde_json::from_str(
            r#"{"id":"long_cycle_both","trigger_kind":"cron","trigger_params":{"hour":4,"minute":0}}"#,
        )
        .unwrap();
        let job = ScheduledJob::try_from(spec).unwrap();
        assert_eq!(
            job.action,
            JobAction::Cycle {
                group: CycleGroup::Both,
                length: CycleLength::Long
            }
        );
        assert!(!job.locked);
    }

    #[test]
    fn spec_with_explicit_action() {
        let spec: JobSpec = serde_json::from_str(
            r#"{"id":"evening_fan","trigger_kind":"cron","trigger_params":{"hour":19},
                "action":{"type":"cycle","group":"fan","length":"short"}}"#,
        )
        .unwrap();
        let job = ScheduledJob::try_from(spec).unwrap();
        assert_eq!(job.trigger, Trigger::Cron { hour: 19, minute: 0 });
    }

    #[test]
    fn unknown_id_without_action_rejected() {
        let spec = JobSpec {
            id: "mystery".into(),
            trigger_kind: TriggerKind::Interval,
            trigger_params: TriggerParams {
                seconds: Some(60),
                ..TriggerParams::default()
            },
            locked: false,
            action: None,
        };
        assert_eq!(ScheduledJob::try_from(spec), Err(JobSpecError::UnknownAction));
    }

    #[test]
    fn out_of_range_hour_rejected() {
        let spec = JobSpec {
            id: "long_cycle_uvc".into(),
            trigger_kind: TriggerKind::Cron,
            trigger_params: TriggerParams {
                hour: Some(24),
                minute: Some(0),
                seconds: None,
            },
            locked: false,
            action: None,
        };
        assert_eq!(ScheduledJob::try_from(spec), Err(JobSpecError::OutOfRange("hour")));
    }

    #[test]
    fn builtin_spec_omits_action() {
        let jobs = default_jobs(&SystemConfig::default());
        for job in &jobs {
            let spec = JobSpec::from(job);
            assert!(spec.action.is_none());
            assert_eq!(ScheduledJob::try_from(spec).as_ref(), Ok(job));
        }
    }
}
