use clap::Parser;

#[derive(Parser)]
#[command(name = "aigate")]
pub(crate) struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    pub(crate) config: String,
    /// Override the configured listen host.
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured listen port.
    #[arg(long)]
    pub(crate) port: Option<u16>,
}
