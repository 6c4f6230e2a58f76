use anyhow::Result;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the number of fill colors must be between 1 and {max}, got {got}")]
    InvalidColorCount { got: u32, max: u32 },
    #[error("the color scheme must not be empty")]
    EmptyColorScheme,
}

/// Options for building and rendering the CFG.
#[derive(Debug, Clone)]
pub struct Config {
    /// end a basic block when execution counts change between an
    /// instruction and its successor, even without a jump there.
    pub split_at_frequency_boundary: bool,

    /// graphviz color scheme used to fill the nodes, like `ylorbr8`.
    pub colorscheme: String,

    /// number of fill colors (from the start of the scheme) used for frequency buckets.
    pub colors: u32,

    /// extra columns between the instruction text and its frequency.
    pub text_padding: usize,
}

impl Config {
    /// graphviz sequential schemes have at most nine colors.
    pub const MAX_COLORS: u32 = 9;

    pub fn with_split_at_frequency_boundary(mut self, split: bool) -> Config {
        self.split_at_frequency_boundary = split;
        self
    }

    pub fn with_colorscheme(mut self, colorscheme: &str) -> Config {
        self.colorscheme = colorscheme.to_string();
        self
    }

    pub fn with_colors(mut self, colors: u32) -> Config {
        self.colors = colors;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.colors == 0 || self.colors > Config::MAX_COLORS {
            return Err(ConfigError::InvalidColorCount {
                got: self.colors,
                max: Config::MAX_COLORS,
            }
            .into());
        }

        if self.colorscheme.is_empty() {
            return Err(ConfigError::EmptyColorScheme.into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            split_at_frequency_boundary: true,
            colorscheme:                 "ylorbr8".to_string(),
            colors:                      4,
            text_padding:                8,
        }
    }
}
