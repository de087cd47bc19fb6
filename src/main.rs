use iptv_relay::cli::Cli;
use iptv_relay::config::Config;
use iptv_relay::core::health::RunOutcome;
use iptv_relay::core::playlist::RefreshOutcome;
use iptv_relay::core::stream::WriterDestination;
use iptv_relay::core::RelayServices;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    let config_path = cli.config.as_deref();

    // Handle configuration commands
    if cli.init {
        let path = Config::init(config_path)?;
        println!("Config ready at {}", path.display());
        return Ok(());
    }

    let config = Config::load(config_path)?;

    if cli.print {
        config.print()?;
        return Ok(());
    }

    if cli.check {
        config.check()?;
        println!("✓ Configuration valid");
        return Ok(());
    }

    // Misconfiguration is the one error class that stops the relay
    config.check()?;
    let mut services = RelayServices::build(&config).await?;

    if cli.vpn_status {
        let status = services.vpn.refresh().await;
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if let Some(channel_id) = cli.stream.as_deref() {
        if let RefreshOutcome::Failed { error } = services.playlist.refresh().await {
            return Err(format!("Playlist unavailable: {}", error).into());
        }

        let index = services.playlist.index();
        let mut destination = WriterDestination::new(tokio::io::stdout());
        let summary = services
            .proxy
            .proxy_channel(&index, channel_id, &mut destination)
            .await
            .map_err(|e| match e.class() {
                Some(class) => format!("{} ({})", e, class.as_str()),
                None => e.to_string(),
            })?;
        eprintln!("Relayed {} bytes in {:?}", summary.bytes, summary.duration);
        return Ok(());
    }

    if cli.once || cli.report {
        if let RefreshOutcome::Failed { error } = services.playlist.refresh().await {
            eprintln!("Playlist refresh failed: {}", error);
        }

        if cli.once {
            if let RunOutcome::Completed(summary) = services.health.run_health_check().await {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }

        let report = services.health.get_health_report().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    // Daemon mode: loops until interrupted
    services.start();
    eprintln!(
        "iptv-relay running (proxy {}), Ctrl-C to stop",
        config.vpn.proxy_uri()
    );
    tokio::signal::ctrl_c().await?;
    services.stop().await;

    Ok(())
}
