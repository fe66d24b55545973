//! Human-readable status reports.
//!
//! A report is a fixed-width table with one row group per connected client:
//!
//! ```text
//! Client ID                                          xDS stream type                Config Status
//! node-1                                             ADS                            CDS   ACKED
//!                                                                                   EDS   STALE
//! ```

use std::fmt;
use std::io::Write;

use crate::client::config::SessionOptions;
use crate::error::{Error, Result};
use crate::message::{StatusResponse, XdsConfigEntry};

mod detail;
mod filter;

pub use detail::{ConfigDump, DetailFormatter};
pub use filter::NodeFilter;

const NO_CLIENTS: &str = "No xDS clients connected.";
const NO_CONFIG: &str = "N/A";

/// xDS resource kind, derived from a resource type URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XdsKind {
    /// Cluster discovery.
    Cds,
    /// Listener discovery.
    Lds,
    /// Route discovery.
    Rds,
    /// Scoped route discovery.
    Srds,
    /// Endpoint discovery.
    Eds,
}

impl XdsKind {
    /// Classify a resource type URL. Returns `None` for unsupported types.
    pub fn from_type_url(type_url: &str) -> Option<Self> {
        match type_url {
            "type.googleapis.com/envoy.config.cluster.v3.Cluster" => Some(Self::Cds),
            "type.googleapis.com/envoy.config.listener.v3.Listener" => Some(Self::Lds),
            "type.googleapis.com/envoy.config.route.v3.RouteConfiguration" => Some(Self::Rds),
            "type.googleapis.com/envoy.config.route.v3.ScopedRouteConfiguration" => {
                Some(Self::Srds)
            }
            "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment" => {
                Some(Self::Eds)
            }
            _ => None,
        }
    }

    /// The short name shown in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cds => "CDS",
            Self::Lds => "LDS",
            Self::Rds => "RDS",
            Self::Srds => "SRDS",
            Self::Eds => "EDS",
        }
    }
}

impl fmt::Display for XdsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders [`StatusResponse`]s as status tables.
pub struct Renderer {
    detail: Box<dyn DetailFormatter>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer").finish_non_exhaustive()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(ConfigDump)
    }
}

impl Renderer {
    /// Create a renderer that hands responses with configuration to `detail`.
    pub fn new(detail: impl DetailFormatter + 'static) -> Self {
        Self {
            detail: Box::new(detail),
        }
    }

    /// Write the report for `response` to `out`.
    ///
    /// Clients are filtered by node id per `options`; clients without a node
    /// bypass the filter, and print no row unless they carry config entries.
    /// Rows already written stay written when a later client carries an
    /// unsupported resource type.
    pub fn render<W: Write + ?Sized>(
        &self,
        response: &StatusResponse,
        options: &SessionOptions,
        out: &mut W,
    ) -> Result<()> {
        if response.clients.is_empty() {
            writeln!(out, "{NO_CLIENTS}")?;
            return Ok(());
        }
        write_row(out, "Client ID", "xDS stream type", "Config Status")?;

        let filter = NodeFilter::new(options.filter_mode, &options.filter_pattern)?;
        let mut has_xds_config = false;

        for client in &response.clients {
            let node = client.node.as_ref();
            let (id, stream_type) =
                node.map_or(("", ""), |node| (node.id.as_str(), node.stream_type()));

            // Records without a node are never filtered out.
            if node.is_some() && filter.as_ref().is_some_and(|f| !f.matches(id)) {
                continue;
            }

            if client.xds_configs.is_empty() {
                if node.is_some() {
                    write_row(out, id, stream_type, NO_CONFIG)?;
                }
                continue;
            }
            has_xds_config = true;

            let statuses = config_statuses(&client.xds_configs)?;
            write!(out, "{id:<50} {stream_type:<30} ")?;
            match statuses.split_first() {
                Some((first, rest)) => {
                    writeln!(out, "{first:<30} ")?;
                    for status in rest {
                        write_row(out, "", "", status)?;
                    }
                }
                None => writeln!(out)?,
            }
        }

        if has_xds_config {
            self.detail.format(response, options)?;
        }
        Ok(())
    }
}

fn write_row<W: Write + ?Sized>(
    out: &mut W,
    id: &str,
    stream_type: &str,
    status: &str,
) -> Result<()> {
    writeln!(out, "{id:<50} {stream_type:<30} {status:<30} ")?;
    Ok(())
}

/// Build the "KIND   STATUS" cells of a client. Entries with an empty status
/// are skipped.
fn config_statuses(entries: &[XdsConfigEntry]) -> Result<Vec<String>> {
    let mut statuses = Vec::with_capacity(entries.len());
    for entry in entries {
        let kind = XdsKind::from_type_url(&entry.type_url)
            .ok_or_else(|| Error::UnsupportedConfigType(entry.type_url.clone()))?;
        if !entry.config_status.is_empty() {
            statuses.push(format!("{kind}   {}", entry.config_status));
        }
    }
    Ok(statuses)
}
