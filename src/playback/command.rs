use std::{collections::HashMap, process::Stdio, sync::Arc};

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::{process::Command, sync::Mutex, task, time};
use tokio_util::sync::CancellationToken;

use crate::{clock::Clock, scheduling::OccurrenceKey};

use super::backend::{SoundPlayer, SoundResource, SpeechSynthesizer};

const VOLUME_PLACEHOLDER: &str = "{volume}";
const INPUT_PLACEHOLDER: &str = "{input}";

/// Runs an external program per request. A new request cancels the one
/// still running, which kills its child process.
struct CommandRunner {
    program: String,
    args: Vec<String>,
    current: Mutex<Option<CancellationToken>>,
}

impl CommandRunner {
    fn new(command: &[String]) -> anyhow::Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("Playback command must not be empty");
        };

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            current: Mutex::new(None),
        })
    }

    /// Arguments with placeholders filled in. The input is appended when no
    /// argument mentions it.
    fn render_args(&self, input: &str, volume: f32) -> Vec<String> {
        let volume = format!("{:.2}", volume.clamp(0.0, 1.0));
        let mut has_input = false;
        let mut rendered: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                has_input |= arg.contains(INPUT_PLACEHOLDER);
                arg.replace(VOLUME_PLACEHOLDER, &volume)
                    .replace(INPUT_PLACEHOLDER, input)
            })
            .collect();

        if !has_input {
            rendered.push(input.to_owned());
        }
        rendered
    }

    async fn supersede(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self.current.lock().await.replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }

    async fn run(&self, input: &str, volume: f32) -> anyhow::Result<()> {
        let token = self.supersede().await;
        let args = self.render_args(input, volume);

        log::debug!("Running {} {args:?}", self.program);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Could not start {}", self.program))?;

        tokio::select! {
            _ = token.cancelled() => {
                log::debug!("{} was superseded", self.program);
                child.kill().await.ok();
                Ok(())
            },
            status = child.wait() => {
                let status = status.with_context(|| format!("{} did not run", self.program))?;
                if status.success() {
                    Ok(())
                } else {
                    bail!("{} exited with {status}", self.program)
                }
            }
        }
    }
}

/// Plays sound files through an external player such as `paplay`.
pub struct CommandSoundPlayer {
    runner: Arc<CommandRunner>,
    clock: Arc<dyn Clock>,
    prescheduled: Mutex<HashMap<OccurrenceKey, CancellationToken>>,
}

impl CommandSoundPlayer {
    pub fn new(command: &[String], clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        Ok(Self {
            runner: Arc::new(CommandRunner::new(command)?),
            clock,
            prescheduled: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl SoundPlayer for CommandSoundPlayer {
    async fn play_sound(&self, sound: &SoundResource, volume: f32) -> anyhow::Result<()> {
        self.runner.run(&sound.location, volume).await
    }

    async fn preschedule(
        &self,
        key: OccurrenceKey,
        sound: &SoundResource,
        volume: f32,
        at: DateTime<Local>,
    ) -> anyhow::Result<bool> {
        let delay = (at - self.clock.now()).to_std().unwrap_or_default();
        let token = CancellationToken::new();
        let task_token = token.clone();
        let runner = self.runner.clone();
        let location = sound.location.clone();

        task::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {},
                _ = time::sleep(delay) => {
                    if let Err(error) = runner.run(&location, volume).await {
                        log::warn!("Pre-scheduled gong for occurrence {key} failed: {error}");
                    }
                }
            }
        });

        if let Some(previous) = self.prescheduled.lock().await.insert(key, token) {
            previous.cancel();
        }
        Ok(true)
    }

    async fn cancel_prescheduled(&self, key: &OccurrenceKey) {
        if let Some(token) = self.prescheduled.lock().await.remove(key) {
            token.cancel();
        }
    }
}

/// Speaks text through an external synthesizer such as `espeak-ng`.
pub struct CommandSpeech {
    runner: CommandRunner,
}

impl CommandSpeech {
    pub fn new(command: &[String]) -> anyhow::Result<Self> {
        Ok(Self {
            runner: CommandRunner::new(command)?,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSpeech {
    async fn speak(&self, text: &str, volume: f32) -> anyhow::Result<()> {
        self.runner.run(text, volume).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(command: &[&str]) -> CommandRunner {
        let command: Vec<String> = command.iter().map(|part| part.to_string()).collect();
        CommandRunner::new(&command).unwrap()
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandRunner::new(&[]).is_err());
    }

    #[test]
    fn input_is_appended_without_placeholder() {
        let runner = runner(&["paplay", "--volume={volume}"]);

        assert_eq!(
            runner.render_args("sounds/gong.mp3", 0.5),
            vec!["--volume=0.50", "sounds/gong.mp3"]
        );
    }

    #[test]
    fn input_placeholder_is_substituted_in_place() {
        let runner = runner(&["espeak-ng", "{input}", "-a", "{volume}"]);

        assert_eq!(
            runner.render_args("It is 7 o'clock.", 1.7),
            vec!["It is 7 o'clock.", "-a", "1.00"]
        );
    }

    #[tokio::test]
    async fn new_request_supersedes_the_running_one() {
        let runner = runner(&["true"]);

        let first = runner.supersede().await;
        let second = runner.supersede().await;

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn missing_program_reports_an_error() {
        let runner = runner(&["chimeclock-no-such-program"]);

        assert!(runner.run("input", 1.0).await.is_err());
    }
}
