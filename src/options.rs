//! Read and write options.

use crate::security::SecurityLimits;
use serde::{Deserialize, Serialize};

/// ZIP compression used for written entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    /// No compression
    Stored,
    /// Deflate
    #[default]
    Deflated,
}

impl Compression {
    pub(crate) fn method(&self) -> zip::CompressionMethod {
        match self {
            Compression::Stored => zip::CompressionMethod::Stored,
            Compression::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

/// How text cells are stored when worksheets are generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharedStringsPolicy {
    /// Keep the original table unless new strings appear; then rebuild it with the
    /// original strings first and new ones appended
    #[default]
    Auto,
    /// Always rebuild the table
    Always,
    /// Write inline strings and no shared string table
    Never,
}

/// Options for reading a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Resource guard thresholds
    pub limits: SecurityLimits,

    /// Rows per batch handed from the streaming parser to the consumer
    pub batch_size: usize,

    /// Batches buffered between parser and consumer
    pub queue_capacity: usize,

    /// XML events between checks of the stream's abort flag
    pub cancel_check_interval: u64,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            limits: SecurityLimits::default(),
            batch_size: 256,
            queue_capacity: 4,
            cancel_check_interval: 1024,
        }
    }
}

impl ReadOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set resource limits.
    pub fn with_limits(mut self, limits: SecurityLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the streaming batch size (at least 1).
    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.max(1);
        self
    }

    /// Set the streaming queue capacity in batches (at least 1).
    pub fn with_queue_capacity(mut self, batches: usize) -> Self {
        self.queue_capacity = batches.max(1);
        self
    }

    /// Set how often the streaming parser checks for cancellation.
    pub fn with_cancel_check_interval(mut self, events: u64) -> Self {
        self.cancel_check_interval = events.max(1);
        self
    }
}

/// Options for writing a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Compression for generated entries; copied entries keep their own
    pub compression: Compression,

    /// Indent generated XML
    pub pretty_print: bool,

    /// Shared string table policy
    pub shared_strings: SharedStringsPolicy,

    /// Prefix text starting with `=`, `+`, `-` or `@` with `'`
    pub escape_formulas: bool,

    /// Resource guard thresholds used when re-reading source parts
    pub limits: SecurityLimits,
}

impl WriteOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Enable or disable indented XML.
    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    /// Set the shared string policy.
    pub fn with_shared_strings(mut self, policy: SharedStringsPolicy) -> Self {
        self.shared_strings = policy;
        self
    }

    /// Enable or disable formula-injection escaping of text.
    pub fn with_escape_formulas(mut self, escape: bool) -> Self {
        self.escape_formulas = escape;
        self
    }

    /// Set resource limits.
    pub fn with_limits(mut self, limits: SecurityLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Options for newly written zip entries.
    pub(crate) fn file_options(&self) -> zip::write::SimpleFileOptions {
        zip::write::SimpleFileOptions::default()
            .compression_method(self.compression.method())
            .large_file(false)
    }
}
