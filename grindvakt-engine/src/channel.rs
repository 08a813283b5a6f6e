//! ## grindvakt-engine::channel
//! **Operator commands delivered to the running daemon**
//!
//! The daemon owns the ledger for as long as it runs, so operator commands
//! issued from another process are sent here instead of touching the store
//! directly. The wire format is one JSON object per line over loopback TCP:
//!
//! ```text
//! -> {"op":"add_criterion","criterion":"cloudfront"}
//! <- {"result":"criterion_added","criterion":"cloudfront"}
//! ```

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use grindvakt_core::BlockRule;
use grindvakt_prevention::UnblockOutcome;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::control::ControlSurface;
use crate::error::{ChannelError, ControlError, EngineError};

/// Grace period for in-progress requests once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    ListRules,
    ListCriteria,
    AddCriterion { criterion: String },
    RemoveCriterion { criterion: String },
    UnblockRule { rule_name: String },
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BadRequest,
    Validation,
    AlreadyExists,
    NotFound,
    Enforcement,
    Storage,
    Metrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeFailure {
    pub ip: IpAddr,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlResponse {
    Rules {
        rules: Vec<BlockRule>,
    },
    Criteria {
        criteria: Vec<String>,
    },
    CriterionAdded {
        criterion: String,
    },
    CriterionRemoved {
        criterion: String,
        unblocked: Vec<IpAddr>,
        not_blocked: Vec<IpAddr>,
        failures: Vec<CascadeFailure>,
    },
    RuleUnblocked {
        rule_name: String,
        ledger_entries_removed: usize,
    },
    RuleNotInstalled {
        rule_name: String,
    },
    Status {
        block_rules: usize,
        criteria: usize,
        metrics: String,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl From<ControlError> for ControlResponse {
    fn from(err: ControlError) -> Self {
        let kind = match &err {
            ControlError::Validation(_) => FailureKind::Validation,
            ControlError::AlreadyExists(_) => FailureKind::AlreadyExists,
            ControlError::NotFound(_) => FailureKind::NotFound,
            ControlError::Enforcement(_) => FailureKind::Enforcement,
            ControlError::Storage(_) => FailureKind::Storage,
            ControlError::Metrics(_) => FailureKind::Metrics,
        };
        ControlResponse::Failed {
            kind,
            message: err.to_string(),
        }
    }
}

/// Executes one request against `control`. Failures become [`ControlResponse::Failed`].
pub async fn dispatch(control: &ControlSurface, request: ControlRequest) -> ControlResponse {
    let result = match request {
        ControlRequest::ListRules => Ok(ControlResponse::Rules {
            rules: control.list_rules().await,
        }),
        ControlRequest::ListCriteria => Ok(ControlResponse::Criteria {
            criteria: control.list_criteria().await,
        }),
        ControlRequest::AddCriterion { criterion } => control
            .add_criterion(&criterion)
            .await
            .map(|()| ControlResponse::CriterionAdded { criterion }),
        ControlRequest::RemoveCriterion { criterion } => {
            control.remove_criterion(&criterion).await.map(|report| {
                ControlResponse::CriterionRemoved {
                    criterion,
                    unblocked: report.unblocked,
                    not_blocked: report.not_blocked,
                    failures: report
                        .failures
                        .into_iter()
                        .map(|(ip, e)| CascadeFailure {
                            ip,
                            error: e.to_string(),
                        })
                        .collect(),
                }
            })
        }
        ControlRequest::UnblockRule { rule_name } => control
            .unblock_by_rule_name(&rule_name)
            .await
            .map(|outcome| match outcome {
                UnblockOutcome::Unblocked {
                    ledger_entries_removed,
                } => ControlResponse::RuleUnblocked {
                    rule_name,
                    ledger_entries_removed,
                },
                UnblockOutcome::NotBlocked => ControlResponse::RuleNotInstalled { rule_name },
            }),
        ControlRequest::Status => control.status().await.map(|s| ControlResponse::Status {
            block_rules: s.block_rules,
            criteria: s.criteria,
            metrics: s.metrics,
        }),
    };
    result.unwrap_or_else(ControlResponse::from)
}

pub struct ControlServer {
    listener: TcpListener,
    control: Arc<ControlSurface>,
}

impl ControlServer {
    pub async fn bind(addr: SocketAddr, control: Arc<ControlSurface>) -> Result<Self, EngineError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| EngineError::ControlBind { addr, source })?;
        Ok(Self { listener, control })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts operator connections until `shutdown` fires, then gives
    /// in-progress requests a short grace period.
    pub async fn serve(self, shutdown: CancellationToken) {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let control = self.control.clone();
                        connections.spawn(
                            async move {
                                if let Err(e) = serve_connection(stream, &control).await {
                                    debug!(error = %e, "Operator connection ended");
                                }
                            }
                            .instrument(info_span!("operator", %peer)),
                        );
                    }
                    Err(e) => warn!(error = %e, "Accepting operator connection failed"),
                },
            }
            while connections.try_join_next().is_some() {}
        }

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Abandoning operator connections still open at shutdown");
            connections.shutdown().await;
        }
        info!("Control channel closed");
    }
}

async fn serve_connection(stream: TcpStream, control: &ControlSurface) -> Result<(), ChannelError> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let response = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(request) => {
                debug!(?request, "Operator request");
                dispatch(control, request).await
            }
            Err(e) => ControlResponse::Failed {
                kind: FailureKind::BadRequest,
                message: e.to_string(),
            },
        };
        write_line(&mut write, &response).await?;
    }
    Ok(())
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut body = serde_json::to_string(message)?;
    body.push('\n');
    writer.write_all(body.as_bytes()).await?;
    Ok(())
}

/// Sends requests to a daemon's [`ControlServer`].
#[derive(Debug, Clone)]
pub struct ControlClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// [`ChannelError::Unavailable`] means no daemon is running at the address.
    pub async fn send(&self, request: &ControlRequest) -> Result<ControlResponse, ChannelError> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| ChannelError::Timeout(self.timeout))?
    }

    async fn exchange(&self, request: &ControlRequest) -> Result<ControlResponse, ChannelError> {
        let stream = match TcpStream::connect(self.addr).await {
            Ok(stream) => stream,
            Err(source) if source.kind() == ErrorKind::ConnectionRefused => {
                return Err(ChannelError::Unavailable {
                    addr: self.addr,
                    source,
                })
            }
            Err(e) => return Err(e.into()),
        };
        let (read, mut write) = stream.into_split();
        write_line(&mut write, request).await?;

        let reply = BufReader::new(read)
            .lines()
            .next_line()
            .await?
            .ok_or(ChannelError::Closed)?;
        Ok(serde_json::from_str(&reply)?)
    }
}
