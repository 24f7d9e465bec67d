//! Parse and export configuration.

use mailedit_codec::LineEnding;

/// Default header fold width (RFC 5322 recommends 78).
pub const DEFAULT_FOLD_WIDTH: usize = 78;

/// Message parse/export configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Fail parsing when a text part cannot be decoded, instead of falling
    /// back to a lossy rendering.
    pub strict_decoding: bool,
    /// Line ending for export. `None` keeps the one detected on parse.
    pub line_ending: Option<LineEnding>,
    /// Header fold width on export. `0` disables folding.
    pub fold_width: usize,
    /// RFC 2047-encode non-ASCII header values on export.
    pub encode_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict_decoding: false,
            line_ending: None,
            fold_width: DEFAULT_FOLD_WIDTH,
            encode_headers: true,
        }
    }
}

impl Config {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Sets strict decoding.
    #[must_use]
    pub const fn strict_decoding(mut self, strict: bool) -> Self {
        self.config.strict_decoding = strict;
        self
    }

    /// Forces a line ending on export.
    #[must_use]
    pub const fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.config.line_ending = Some(line_ending);
        self
    }

    /// Sets the header fold width.
    #[must_use]
    pub const fn fold_width(mut self, width: usize) -> Self {
        self.config.fold_width = width;
        self
    }

    /// Enables or disables RFC 2047 header encoding on export.
    #[must_use]
    pub const fn encode_headers(mut self, encode: bool) -> Self {
        self.config.encode_headers = encode;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}
