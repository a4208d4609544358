use chrono::{DateTime, Utc};
use cron::Schedule as CronExpr;
use jobs_core::{JobsError, JobsResult};
use jobs_domain::entities::{CrontabSchedule, Job, Schedule, ScheduleRule};
use std::str::FromStr;
use tracing::debug;

/// 调度规则求值器
///
/// 依据作业的调度规则与上次评估时间判断当前时刻是否到期。
/// 间隔规则在距上次评估满一个间隔时到期（含边界），crontab规则在
/// 上次评估之后的下一个触发点已过时到期。
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleEvaluator;

impl ScheduleEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// 判断作业在now时刻是否到期
    pub fn is_due(&self, job: &Job, now: DateTime<Utc>) -> JobsResult<bool> {
        let Some(schedule) = job.schedule.as_ref() else {
            return Ok(false);
        };
        if !schedule.enabled {
            debug!("作业 {} 的调度规则已停用，跳过", job.name);
            return Ok(false);
        }

        let Some(last) = job.last_evaluated_at else {
            // 从未评估过的作业立即触发一次
            debug!("作业 {} 尚未评估过，立即触发", job.name);
            return Ok(true);
        };

        match &schedule.rule {
            ScheduleRule::Interval(interval) => Ok(now - last >= interval.duration()),
            ScheduleRule::Crontab(crontab) => {
                let expr = Self::parse_crontab(crontab)?;
                match expr.after(&last).next() {
                    Some(next) => {
                        debug!(
                            "作业 {} 下次触发时间: {}, 当前时间: {}",
                            job.name,
                            next.format("%Y-%m-%d %H:%M:%S UTC"),
                            now.format("%Y-%m-%d %H:%M:%S UTC")
                        );
                        Ok(next <= now)
                    }
                    None => Ok(false),
                }
            }
        }
    }

    /// 计算from时刻之后的下一次触发时间
    pub fn next_occurrence(
        &self,
        job: &Job,
        from: DateTime<Utc>,
    ) -> JobsResult<Option<DateTime<Utc>>> {
        let Some(schedule) = job.schedule.as_ref() else {
            return Ok(None);
        };
        if !schedule.enabled {
            return Ok(None);
        }
        match &schedule.rule {
            ScheduleRule::Interval(interval) => {
                let base = job.last_evaluated_at.unwrap_or(from);
                Ok(Some(base + interval.duration()))
            }
            ScheduleRule::Crontab(crontab) => {
                let expr = Self::parse_crontab(crontab)?;
                Ok(expr.after(&from).next())
            }
        }
    }

    /// 校验调度规则
    pub fn validate(schedule: &Schedule) -> JobsResult<()> {
        match &schedule.rule {
            ScheduleRule::Interval(interval) => {
                if interval.duration() <= chrono::Duration::zero() {
                    return Err(JobsError::InvalidSchedule {
                        expr: format!("{interval:?}"),
                        message: "间隔必须大于0".to_string(),
                    });
                }
                Ok(())
            }
            ScheduleRule::Crontab(crontab) => Self::parse_crontab(crontab).map(|_| ()),
        }
    }

    fn parse_crontab(crontab: &CrontabSchedule) -> JobsResult<CronExpr> {
        let expr = crontab.cron_expression();
        CronExpr::from_str(&expr).map_err(|e| JobsError::InvalidSchedule {
            expr,
            message: e.to_string(),
        })
    }
}
