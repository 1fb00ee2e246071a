use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "talpa",
    about = "Patricia-trie dictionary engine for predictive text",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty dictionary directory
    Create {
        /// Target dictionary directory (its name becomes the dictionary name)
        dir: String,

        /// Dictionary locale, e.g. "en"
        #[arg(short, long, default_value = "en")]
        locale: String,

        /// Format version (402 or 403)
        #[arg(long, default_value_t = 403)]
        version: u16,

        /// Enable the forgetting curve (decaying dictionary)
        #[arg(long)]
        decaying: bool,
    },

    /// Add unigrams from stdin or arguments ("word probability" pairs)
    Add {
        /// Dictionary directory
        dir: String,

        /// Words as word=probability pairs, e.g. cat=120
        words: Vec<String>,
    },

    /// Look up a word's probability and stored property
    Lookup {
        /// Dictionary directory
        dir: String,

        /// Word to look up
        word: String,
    },

    /// Inspect a dictionary: header attributes and counts as JSON
    Inspect {
        /// Dictionary directory
        dir: String,
    },

    /// Compact a dictionary in place (flush with GC)
    Compact {
        /// Dictionary directory
        dir: String,
    },
}
