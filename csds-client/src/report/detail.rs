//! Detailed configuration output.

use std::fs::File;
use std::io::{BufWriter, Write};

use serde::Serialize;
use tracing::info;

use crate::client::config::SessionOptions;
use crate::error::Result;
use crate::message::{StatusResponse, XdsConfigEntry};
use crate::report::XdsKind;

/// Produces the detailed view of a response after its summary table.
///
/// Called at most once per rendered response, and only when at least one
/// client that passed the filter reported configuration entries.
pub trait DetailFormatter: Send + Sync {
    /// Emit the detailed view of `response`.
    fn format(&self, response: &StatusResponse, options: &SessionOptions) -> Result<()>;
}

/// Writes the response as pretty-printed JSON to
/// [`SessionOptions::output_file`]. Does nothing when no file is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigDump;

#[derive(Serialize)]
struct DumpClient<'a> {
    id: &'a str,
    stream_type: &'a str,
    metadata: Option<&'a serde_json::Map<String, serde_json::Value>>,
    configs: Vec<DumpEntry<'a>>,
}

#[derive(Serialize)]
struct DumpEntry<'a> {
    kind: Option<&'static str>,
    type_url: &'a str,
    name: &'a str,
    version_info: &'a str,
    config_status: &'a str,
    client_status: &'a str,
    is_static_resource: bool,
}

impl<'a> From<&'a XdsConfigEntry> for DumpEntry<'a> {
    fn from(entry: &'a XdsConfigEntry) -> Self {
        Self {
            kind: XdsKind::from_type_url(&entry.type_url).map(|kind| kind.as_str()),
            type_url: &entry.type_url,
            name: &entry.name,
            version_info: &entry.version_info,
            config_status: &entry.config_status,
            client_status: &entry.client_status,
            is_static_resource: entry.is_static_resource,
        }
    }
}

fn dump(response: &StatusResponse) -> Vec<DumpClient<'_>> {
    response
        .clients
        .iter()
        .map(|client| DumpClient {
            id: client.node.as_ref().map_or("", |node| node.id.as_str()),
            stream_type: client.node.as_ref().map_or("", |node| node.stream_type()),
            metadata: client.node.as_ref().map(|node| &node.metadata),
            configs: client.xds_configs.iter().map(DumpEntry::from).collect(),
        })
        .collect()
}

impl DetailFormatter for ConfigDump {
    fn format(&self, response: &StatusResponse, options: &SessionOptions) -> Result<()> {
        let Some(path) = &options.output_file else {
            return Ok(());
        };
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &dump(response))?;
        writer.flush()?;
        info!(
            path = %path.display(),
            clients = response.clients.len(),
            "config dump written"
        );
        Ok(())
    }
}
