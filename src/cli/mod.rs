use crate::constants::{APP_DESCRIPTION, LOG_FORMAT_JSON, LOG_FORMAT_TEXT};
use clap::builder::PossibleValuesParser;
use clap::Parser;
use std::path::PathBuf;

/// Opens an encrypted file in its default program and re-encrypts it when editing ends
#[derive(Parser, Debug)]
#[clap(name = "encedit", about = APP_DESCRIPTION)]
#[clap(author, version, long_about = None)]
pub struct CliArgs {
    /// Encrypted file to open (for example report.pdf.enc)
    pub artifact: Option<PathBuf>,

    /// Put back the backup left by an interrupted session instead of opening the file
    #[clap(long)]
    pub recover: bool,

    /// Print verbose output
    #[clap(short = 'v', long)]
    pub verbose: bool,

    /// Log output format
    #[clap(
        long,
        default_value = LOG_FORMAT_TEXT,
        value_parser = PossibleValuesParser::new([LOG_FORMAT_TEXT, LOG_FORMAT_JSON])
    )]
    pub log_format: String,
}

impl CliArgs {
    /// Whether structured JSON logs were requested.
    pub fn json_logs(&self) -> bool {
        self.log_format == LOG_FORMAT_JSON
    }
}
