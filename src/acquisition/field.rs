//! Field-protocol session abstraction
//!
//! The field network exposes a tree of named numeric variables under the
//! root `Objects` node. Sessions are short-lived: every read or apply opens a
//! fresh session, locates the process node by display-name match, does its
//! work and disconnects. No node handle survives a reconnect.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Field-protocol errors
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Session timed out after {0:?}")]
    Timeout(Duration),

    #[error("No node matching '{0}' under Objects")]
    NodeNotFound(String),

    #[error("Read failed for {node}: {message}")]
    ReadFailed { node: String, message: String },

    #[error("Write failed for {node}: {message}")]
    WriteFailed { node: String, message: String },

    #[error("Session is closed")]
    SessionClosed,
}

/// Reference to a node in the endpoint's address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub node_id: String,
    /// Qualified browse name, possibly namespace-prefixed (`2:fc1065`)
    pub browse_name: String,
    pub display_name: String,
}

impl NodeRef {
    /// Browse name with any namespace prefix stripped.
    pub fn variable_name(&self) -> &str {
        self.browse_name
            .rsplit_once(':')
            .map_or(self.browse_name.as_str(), |(_, name)| name)
    }
}

/// An endpoint sessions can be opened against.
#[async_trait]
pub trait FieldEndpoint: Send + Sync + 'static {
    type Session: FieldSession;

    /// Open a fresh session. No transport security is negotiated.
    async fn connect(&self) -> Result<Self::Session, FieldError>;

    /// Endpoint address for logging.
    fn endpoint_url(&self) -> &str;

    /// True when reads and writes stay in process and never reach a plant.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// One open session against a field endpoint.
#[async_trait]
pub trait FieldSession: Send {
    /// Children of the root `Objects` node.
    async fn browse_objects(&mut self) -> Result<Vec<NodeRef>, FieldError>;

    /// Children of an arbitrary node.
    async fn browse_children(&mut self, node: &NodeRef) -> Result<Vec<NodeRef>, FieldError>;

    /// Read a scalar value, converted to `f64`.
    async fn read_value(&mut self, node: &NodeRef) -> Result<f64, FieldError>;

    async fn write_value(&mut self, node: &NodeRef, value: f64) -> Result<(), FieldError>;

    /// Close the session. Safe to call on an already closed session.
    async fn disconnect(&mut self) -> Result<(), FieldError>;
}

/// Single time budget shared by the connect and all work done in the session.
#[derive(Debug, Clone, Copy)]
pub struct SessionDeadline {
    at: Instant,
    budget: Duration,
}

impl SessionDeadline {
    /// Start the clock now.
    pub fn start(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Run `fut` until it finishes or the deadline passes.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, FieldError> {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| FieldError::Timeout(self.budget))
    }
}

/// Open a session, bounding the connect by `deadline`.
pub async fn open_session<E: FieldEndpoint + ?Sized>(
    endpoint: &E,
    deadline: &SessionDeadline,
) -> Result<E::Session, FieldError> {
    deadline.run(endpoint.connect()).await?
}

/// Disconnect, logging rather than propagating a failure to close.
pub async fn close_session<S: FieldSession + ?Sized>(session: &mut S) {
    if let Err(e) = session.disconnect().await {
        debug!(error = %e, "Field session disconnect failed");
    }
}

/// Find the first node under `Objects` whose display name contains `marker`.
pub async fn locate_process_node<S: FieldSession + ?Sized>(
    session: &mut S,
    marker: &str,
) -> Result<NodeRef, FieldError> {
    session
        .browse_objects()
        .await?
        .into_iter()
        .find(|node| node.display_name.contains(marker))
        .ok_or_else(|| FieldError::NodeNotFound(marker.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(browse_name: &str) -> NodeRef {
        NodeRef {
            node_id: format!("ns=1;s={browse_name}"),
            browse_name: browse_name.to_string(),
            display_name: browse_name.to_string(),
        }
    }

    #[test]
    fn test_variable_name_strips_namespace() {
        assert_eq!(node("2:fc1065").variable_name(), "fc1065");
        assert_eq!(node("bit_tq").variable_name(), "bit_tq");
    }

    #[tokio::test]
    async fn test_deadline_is_shared_across_steps() {
        let budget = Duration::from_millis(100);
        let deadline = SessionDeadline::start(budget);

        let first = deadline.run(tokio::time::sleep(Duration::from_millis(60))).await;
        assert!(first.is_ok());

        // Fits the budget on its own, but not what is left of it.
        let second = deadline.run(tokio::time::sleep(Duration::from_millis(60))).await;
        assert!(matches!(second, Err(FieldError::Timeout(d)) if d == budget));
    }
}
