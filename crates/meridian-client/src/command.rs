//! The attempt-loop state machine every command flows through (§4.8).
//!
//! One `maxRetries+1` loop, one deadline check, one in-doubt tagging
//! rule, shared by single-key, batch, and scan/query commands through
//! the `Dispatch` trait — rather than each command type re-implementing
//! its own retry logic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use meridian_cluster::Node;
use meridian_core::{CommandError, Error};
use meridian_net::Connection;

use crate::policy::BasePolicy;

/// What a single attempt actually does once it has a live connection.
/// `command.rs` owns resolving a node, acquiring a connection, and
/// retry bookkeeping; `Dispatch` owns only the wire exchange.
pub trait Dispatch {
    type Output;

    /// Whether this command is a write whose server acknowledgement,
    /// if never received, makes the outcome in-doubt rather than a
    /// plain failure.
    fn is_write(&self) -> bool {
        false
    }

    /// Send the request and parse the reply over `conn`, observing
    /// `socket_timeout` for each I/O call.
    fn execute(&mut self, conn: &mut Connection, socket_timeout: Duration) -> Result<Self::Output, Error>;
}

/// Resolves which node an attempt should target. Implemented by the
/// single-key partition resolver for simple commands; batch/scan
/// commands resolve once per sub-request up front and pass a
/// constant-node closure here instead.
pub trait ResolveNode {
    fn resolve(&mut self, attempt_number: u32) -> Result<Arc<Node>, Error>;
}

impl<F> ResolveNode for F
where
    F: FnMut(u32) -> Result<Arc<Node>, Error>,
{
    fn resolve(&mut self, attempt_number: u32) -> Result<Arc<Node>, Error> {
        self(attempt_number)
    }
}

/// Run `dispatch` to completion against the retry policy in `policy`,
/// using `resolve` to pick a node for each attempt and `dial` to
/// establish fresh connections when a node's pool is empty.
///
/// Mirrors §4.8 steps 2-3 verbatim: attempt up to `maxRetries + 1`
/// times, sleeping `sleepBetweenRetries` between attempts, stopping
/// once `totalTimeout` has elapsed, and tagging the final error
/// in-doubt when the failing attempt was a write that may have reached
/// the server.
pub fn run_command<D, R>(
    policy: &BasePolicy,
    mut resolve: R,
    dial: impl Fn(&meridian_core::Host) -> Result<Connection, Error> + Copy,
    dispatch: &mut D,
) -> Result<D::Output, CommandError>
where
    D: Dispatch,
    R: ResolveNode,
{
    let deadline = policy.deadline();
    let max_attempts = policy.max_retries.unwrap_or(0) + 1;
    let mut attempts_log: Vec<Error> = Vec::new();
    let mut last_node: Option<String> = None;

    for attempt_number in 0..max_attempts as u32 {
        if let Some(d) = deadline {
            if Instant::now() >= d {
                let last = attempts_log.pop().unwrap_or(Error::TotalTimeout(policy.timeout));
                return Err(finish(last, last_node, dispatch.is_write(), attempts_log));
            }
        }

        let node = match resolve.resolve(attempt_number) {
            Ok(node) => node,
            Err(e) => {
                attempts_log.push(e);
                continue;
            }
        };
        last_node = Some(node.name.clone());

        let socket_timeout = policy.effective_socket_timeout(deadline);
        let mut guard = match node.pools.acquire(&node.host, dial) {
            Ok(g) => g,
            Err(e) => {
                attempts_log.push(e);
                sleep_before_retry(policy, deadline);
                continue;
            }
        };

        match dispatch.execute(guard.get_mut(), socket_timeout) {
            Ok(output) => return Ok(output),
            Err(e) => {
                let retryable = e.is_retryable();
                // Any I/O or timeout error means the connection's framing
                // state is unknown; never return it to the pool.
                if matches!(e.kind(), meridian_core::ErrorKind::Connection | meridian_core::ErrorKind::Timeout) {
                    guard.discard();
                } else {
                    drop(guard);
                }
                attempts_log.push(e);
                if !retryable {
                    let last = attempts_log.pop().unwrap();
                    return Err(finish(last, last_node, dispatch.is_write(), attempts_log));
                }
                sleep_before_retry(policy, deadline);
            }
        }
    }

    let last = attempts_log.pop().unwrap_or(Error::TotalTimeout(policy.timeout));
    Err(finish(last, last_node, dispatch.is_write(), attempts_log))
}

fn sleep_before_retry(policy: &BasePolicy, deadline: Option<Instant>) {
    if let Some(d) = deadline {
        if Instant::now() >= d {
            return;
        }
    }
    std::thread::sleep(policy.sleep_between_retries);
}

/// §7: a failed write is in-doubt only if its request may have reached
/// the server — i.e. the failure was a timeout or connection error
/// rather than a result the server explicitly rejected.
fn finish(last: Error, node: Option<String>, is_write: bool, attempts: Vec<Error>) -> CommandError {
    let in_doubt = is_write
        && matches!(
            last.kind(),
            meridian_core::ErrorKind::Timeout | meridian_core::ErrorKind::Connection
        );
    let mut err = CommandError::new(last).with_in_doubt(in_doubt).with_attempts(attempts);
    if let Some(node) = node {
        err = err.with_node(node);
    }
    err
}
