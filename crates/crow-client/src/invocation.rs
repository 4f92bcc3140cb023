//! Client invocation pipeline (spec §4.5, C9): discover, pick an
//! endpoint, call through the pooled transport, retry on transport
//! failure, and attribute success/failure back to the finder's cache.

use crate::error::{CallError, CallResult};
use crate::finder::Finder;
use crow_core::ServiceDescriptor;
use crow_transport::ConnectionPool;
use crow_wire::{Record, Value};
use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum CallOutcome {
    Unary(Value),
    Stream(Vec<Value>),
}

#[derive(Debug, Clone)]
pub struct CallConfig {
    pub write_timeout: Duration,
    pub read_timeout: Duration,
    pub retry_count: u32,
    pub retry_base_interval: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            retry_count: 3,
            retry_base_interval: Duration::from_millis(200),
        }
    }
}

impl CallConfig {
    /// The overall wait ceiling before a caller gives up for good: four
    /// attempts' worth of round-trip plus backoff (spec §4.5).
    fn overall_ceiling(&self) -> Duration {
        let per_attempt = self.write_timeout + self.read_timeout + self.retry_base_interval;
        per_attempt * 4
    }
}

/// Resolves `descriptor`, invokes `fn_name` with `args` against a
/// randomly chosen matching endpoint, and retries on transport failure up
/// to `config.retry_count` times with linearly scaling backoff. Bounded
/// overall by four attempts' worth of timeout-plus-backoff so a caller
/// never blocks indefinitely on a wedged registrar or service.
pub async fn call(
    finder: &dyn Finder,
    pool: &ConnectionPool,
    descriptor: &ServiceDescriptor,
    fn_name: &str,
    args: Value,
    config: &CallConfig,
) -> CallResult<CallOutcome> {
    match tokio::time::timeout(
        config.overall_ceiling(),
        call_with_retry(finder, pool, descriptor, fn_name, args, config),
    )
    .await
    {
        Ok(result) => result,
        Err(_elapsed) => Err(CallError::Timeout),
    }
}

async fn call_with_retry(
    finder: &dyn Finder,
    pool: &ConnectionPool,
    descriptor: &ServiceDescriptor,
    fn_name: &str,
    args: Value,
    config: &CallConfig,
) -> CallResult<CallOutcome> {
    let mut attempt = 0u32;
    loop {
        let endpoints = finder.find_services(descriptor).await?;
        if endpoints.is_empty() {
            return Err(CallError::NoInstanceFound);
        }
        let mut candidates = endpoints;
        candidates.shuffle(&mut rand::thread_rng());
        let endpoint = candidates.into_iter().next().expect("checked non-empty above");

        let request = Record::RemoteCall {
            target_ns: descriptor.service_name.clone(),
            fn_name: fn_name.to_string(),
            args: args.clone(),
        };

        match crow_transport::call(
            pool,
            &endpoint.address,
            endpoint.port,
            &request,
            config.write_timeout,
            config.read_timeout,
        )
        .await
        {
            Ok(replies) => return assemble(replies),
            Err(err) => {
                finder.remove_service(descriptor, &endpoint).await;
                attempt += 1;
                if attempt >= config.retry_count || !err.is_retryable() {
                    warn!(endpoint = %endpoint.service_id, error = %err, "call failed, giving up");
                    return Err(CallError::Transport(err));
                }
                warn!(endpoint = %endpoint.service_id, error = %err, attempt, "call failed, retrying");
                sleep(config.retry_base_interval * attempt).await;
            }
        }
    }
}

fn assemble(mut replies: Vec<Record>) -> CallResult<CallOutcome> {
    match replies.first() {
        Some(Record::CallResult { .. }) => match replies.remove(0) {
            Record::CallResult { obj } => Ok(CallOutcome::Unary(obj)),
            _ => unreachable!(),
        },
        Some(Record::SequentialItemStart { .. }) => {
            let items = replies
                .into_iter()
                .filter_map(|record| match record {
                    Record::SequentialItem { obj, .. } => Some(obj),
                    _ => None,
                })
                .collect();
            Ok(CallOutcome::Stream(items))
        }
        Some(Record::CallException { .. }) => match replies.remove(0) {
            Record::CallException { kind, stack_trace } => Err(CallError::Remote { kind, stack_trace }),
            _ => unreachable!(),
        },
        Some(Record::ProtocolError { .. }) => match replies.remove(0) {
            Record::ProtocolError { code, message } => Err(CallError::Protocol { code, message }),
            _ => unreachable!(),
        },
        other => Err(CallError::Protocol {
            code: "unexpected-reply".to_string(),
            message: format!("{other:?}"),
        }),
    }
}
