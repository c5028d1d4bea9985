use std::sync::Arc;

use anyhow::Context;
use chimeclock::{
    appsettings::{AppSettings, SchedulerMode},
    clock::{Clock, SystemClock},
    playback::{CommandSoundPlayer, CommandSpeech, NoopKeepAwake, PlaybackSequencer},
    recurrence::remaining_time,
    scheduling::TokioWakeupService,
    service::{AlarmClock, ServiceOptions, Wakeups},
    storage::JsonFileStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let settings = AppSettings::load().context("Could not load settings")?;
    log::debug!("Settings: {settings:?}");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sound = CommandSoundPlayer::new(&settings.playback.sound_command, clock.clone())
        .context("Invalid playback.sound_command")?;
    let speech = CommandSpeech::new(&settings.playback.speech_command)
        .context("Invalid playback.speech_command")?;
    let sequencer = Arc::new(PlaybackSequencer::new(
        Arc::new(sound),
        Arc::new(speech),
        Arc::new(NoopKeepAwake),
        clock.clone(),
        settings.playback_options(),
    ));

    let wakeups = match settings.scheduler.mode {
        SchedulerMode::Polling => Wakeups::Polling {
            interval: settings.poll_interval(),
        },
        SchedulerMode::Callback => {
            let (service, fired) = TokioWakeupService::new(clock.clone());
            Wakeups::Callback {
                service: Arc::new(service),
                fired,
            }
        }
    };

    let alarm_clock = AlarmClock::start(
        Arc::new(JsonFileStore::new(settings.storage.path.clone())),
        wakeups,
        sequencer,
        clock.clone(),
        ServiceOptions {
            horizon: settings.horizon(),
            refresh_interval: settings.refresh_interval(),
        },
    )
    .await;

    let now = clock.now();
    let upcoming = alarm_clock.upcoming().await;
    log::info!("{} alarm(s) within the next {} h", upcoming.len(), settings.horizon().num_hours());
    for occurrence in upcoming {
        log::info!(
            "  {} in {} (occurrence {})",
            occurrence.fire_at.format("%a %H:%M"),
            remaining_time(&occurrence.fire_at, &now),
            occurrence.key
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Could not listen for Ctrl-C")?;
    log::info!("Shutting down");
    alarm_clock.shutdown().await;

    Ok(())
}
