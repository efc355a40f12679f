use anyhow::Context;
use clap::Parser;
use mackerel_cloudwatch_plugin::clock::{Clock, SystemClock};
use mackerel_cloudwatch_plugin::cloudwatch::aws::CloudWatchApi;
use mackerel_cloudwatch_plugin::collectors::MetricsPlugin;
use mackerel_cloudwatch_plugin::config::Config;
use mackerel_cloudwatch_plugin::plugin::CloudWatchPlugin;
use mackerel_cloudwatch_plugin::reporter::{Mode, Reporter};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(config.json_logs);

    // Validate the definition before anything touches the network.
    let definition = config.plugin_definition()?;

    let api = CloudWatchApi::connect(&config.aws_settings()).await;
    let plugin = CloudWatchPlugin::prepare(definition, api, Box::new(SystemClock))
        .await
        .context("resource discovery failed")?
        .with_concurrency(usize::from(config.concurrency));

    let reporter = Reporter::new(config.resolved_tempfile(plugin.name()));
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    reporter
        .run(&plugin, Mode::from_env(), SystemClock.now(), &mut out)
        .await?;

    Ok(())
}

/// stdout carries the agent protocol, so logs go to stderr.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
