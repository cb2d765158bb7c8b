use clap::Parser;

#[derive(Parser)]
#[command(name = "smproxy")]
pub(crate) struct Cli {
    /// Bind host; overrides the config file.
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Bind port; overrides the config file.
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Directory holding credentials.json, models.json and config.json.
    #[arg(long, default_value = "data")]
    pub(crate) data_dir: String,
}
