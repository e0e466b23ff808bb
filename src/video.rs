use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde_json::{json, Value};

#[cfg(unix)]
use rand::{distributions::Alphanumeric, Rng};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::feed::Post;

const OBSERVE_BUFFERING_ID: u64 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoSource {
    pub playback_url: String,
    pub label: String,
}

impl VideoSource {
    pub fn from_post(post: &Post) -> Option<Self> {
        let playback_url = sanitize_url(&post.video_url);
        if playback_url.is_empty() {
            return None;
        }
        let label = if post.author.name.trim().is_empty() {
            format!("reel {}", post.id)
        } else {
            format!("@{} · {}", post.author.name.trim(), post.id)
        };
        Some(Self {
            playback_url,
            label,
        })
    }
}

fn sanitize_url(raw: &str) -> String {
    raw.trim().replace("&amp;", "&")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    Buffering(bool),
    Error(String),
}

/// What the feed screen needs from a video backend.
pub trait Player: Send {
    fn load(&mut self, source: &VideoSource, paused: bool, muted: bool) -> Result<()>;
    fn set_paused(&mut self, paused: bool) -> Result<()>;
    fn set_muted(&mut self, muted: bool) -> Result<()>;
    fn stop(&mut self);
    fn poll_events(&mut self) -> Vec<PlaybackEvent>;
}

/// Stand-in when playback is disabled.
#[derive(Default)]
pub struct NullPlayer;

impl Player for NullPlayer {
    fn load(&mut self, source: &VideoSource, _paused: bool, _muted: bool) -> Result<()> {
        tracing::debug!(url = %source.playback_url, "playback disabled, not loading video");
        Ok(())
    }

    fn set_paused(&mut self, _paused: bool) -> Result<()> {
        Ok(())
    }

    fn set_muted(&mut self, _muted: bool) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn poll_events(&mut self) -> Vec<PlaybackEvent> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub struct MpvOptions {
    pub mpv_path: String,
    pub user_agent: Option<String>,
}

impl Default for MpvOptions {
    fn default() -> Self {
        Self {
            mpv_path: "mpv".to_string(),
            user_agent: None,
        }
    }
}

/// Plays one video at a time in an mpv window, controlled over JSON IPC.
pub struct MpvPlayer {
    options: MpvOptions,
    session: Option<Session>,
}

/// Events travel on a per-session channel, so anything a stopped session's
/// threads still emit is dropped with its receiver.
struct Session {
    kill_tx: Sender<()>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    ipc_path: Option<String>,
    events_rx: Receiver<PlaybackEvent>,
}

impl Session {
    fn send(&self, command: VideoCommand) -> Result<()> {
        let Some(path) = &self.ipc_path else {
            return Err(anyhow!("video controls are not supported on this platform"));
        };
        send_ipc_command(path, command)
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let _ = self.kill_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl MpvPlayer {
    pub fn new(options: MpvOptions) -> Self {
        Self {
            options,
            session: None,
        }
    }

    fn active_session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("no video is loaded"))
    }
}

impl Player for MpvPlayer {
    fn load(&mut self, source: &VideoSource, paused: bool, muted: bool) -> Result<()> {
        self.stop();
        if source.playback_url.trim().is_empty() {
            return Err(anyhow!("video URL missing"));
        }
        let session = spawn_session(&self.options, source, paused, muted)?;
        self.session = Some(session);
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        self.active_session()?.send(VideoCommand::SetPaused(paused))
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.active_session()?.send(VideoCommand::SetMuted(muted))
    }

    fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.shutdown();
        }
    }

    fn poll_events(&mut self) -> Vec<PlaybackEvent> {
        match &self.session {
            Some(session) => session.events_rx.try_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn launch_args(
    options: &MpvOptions,
    source: &VideoSource,
    paused: bool,
    muted: bool,
    ipc_path: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        source.playback_url.clone(),
        "--force-window=yes".to_string(),
        "--keep-open=no".to_string(),
        "--loop-file=inf".to_string(),
        "--keepaspect=no".to_string(),
        "--really-quiet".to_string(),
        "--no-config".to_string(),
        "--ytdl=no".to_string(),
        format!("--pause={}", yes_no(paused)),
        format!("--mute={}", yes_no(muted)),
    ];
    if let Some(path) = ipc_path {
        args.push(format!("--input-ipc-server={path}"));
    }
    if let Some(agent) = options.user_agent.as_deref() {
        if !agent.trim().is_empty() {
            args.push(format!("--user-agent={}", agent.trim()));
        }
    }
    if !source.label.is_empty() {
        args.push(format!("--force-media-title={}", source.label));
    }
    args
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn spawn_session(
    options: &MpvOptions,
    source: &VideoSource,
    paused: bool,
    muted: bool,
) -> Result<Session> {
    let ipc_path = unique_ipc_path();
    #[cfg(unix)]
    if let Some(path) = &ipc_path {
        cleanup_ipc_path(path);
    }
    let args = launch_args(options, source, paused, muted, ipc_path.as_deref());
    tracing::debug!(?args, "spawning mpv");

    let mut command = Command::new(&options.mpv_path);
    command.args(&args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());
    let mut child = command
        .spawn()
        .with_context(|| format!("launch mpv to play {}", source.playback_url))?;

    let (kill_tx, kill_rx) = bounded::<()>(1);
    let (events, events_rx) = unbounded();
    let stop_flag = Arc::new(AtomicBool::new(false));

    #[cfg(unix)]
    if let Some(path) = ipc_path.clone() {
        let events = events.clone();
        let stop = stop_flag.clone();
        thread::spawn(move || watch_ipc_events(&path, &events, &stop));
    }

    let url = source.playback_url.clone();
    let ipc_cleanup = ipc_path.clone();
    let handle = thread::spawn(move || {
        loop {
            if kill_rx.try_recv().is_ok() {
                let _ = child.kill();
                let _ = child.wait();
                tracing::debug!(%url, "mpv stopped");
                break;
            }
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        let _ = events.send(PlaybackEvent::Error(format!(
                            "mpv exited with status {:?}",
                            status.code()
                        )));
                    }
                    break;
                }
                Ok(None) => thread::sleep(Duration::from_millis(30)),
                Err(err) => {
                    let _ = events.send(PlaybackEvent::Error(format!("poll mpv status: {err}")));
                    break;
                }
            }
        }
        if let Some(path) = ipc_cleanup {
            cleanup_ipc_path(&path);
        }
    });

    Ok(Session {
        kill_tx,
        stop_flag,
        handle: Some(handle),
        ipc_path,
        events_rx,
    })
}

#[cfg(unix)]
fn watch_ipc_events(path: &str, events: &Sender<PlaybackEvent>, stop: &AtomicBool) {
    let mut stream = None;
    for _ in 0..50 {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        match UnixStream::connect(path) {
            Ok(conn) => {
                stream = Some(conn);
                break;
            }
            Err(_) => thread::sleep(Duration::from_millis(100)),
        }
    }
    let Some(mut stream) = stream else {
        let _ = events.send(PlaybackEvent::Error(format!(
            "mpv IPC socket {path} never became available"
        )));
        return;
    };

    let observe = json!({
        "command": ["observe_property", OBSERVE_BUFFERING_ID, "paused-for-cache"],
    });
    if let Err(err) = stream
        .write_all(format!("{observe}\n").as_bytes())
        .context("subscribe to mpv buffering state")
    {
        let _ = events.send(PlaybackEvent::Error(format!("{err:#}")));
        return;
    }
    let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));

    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return,
            Ok(_) => {
                if let Some(event) = parse_ipc_event(&line) {
                    if events.send(event).is_err() {
                        return;
                    }
                }
                line.clear();
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(err) => {
                tracing::debug!(error = %err, "mpv IPC stream closed");
                return;
            }
        }
    }
}

fn parse_ipc_event(line: &[u8]) -> Option<PlaybackEvent> {
    let value: Value = serde_json::from_slice(line).ok()?;
    match value.get("event").and_then(Value::as_str)? {
        "property-change" if value.get("name")? == "paused-for-cache" => {
            Some(PlaybackEvent::Buffering(
                value.get("data").and_then(Value::as_bool).unwrap_or(false),
            ))
        }
        "end-file" if value.get("reason").and_then(Value::as_str) == Some("error") => {
            let detail = value
                .get("file_error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            Some(PlaybackEvent::Error(format!("mpv could not play file: {detail}")))
        }
        _ => None,
    }
}

#[derive(Clone, Copy, Debug)]
enum VideoCommand {
    SetPaused(bool),
    SetMuted(bool),
}

fn command_payload(command: VideoCommand) -> Value {
    match command {
        VideoCommand::SetPaused(paused) => json!(["set_property", "pause", paused]),
        VideoCommand::SetMuted(muted) => json!(["set_property", "mute", muted]),
    }
}

fn send_ipc_command(path: &str, command: VideoCommand) -> Result<()> {
    let payload = json!({
        "command": command_payload(command),
    });
    let serialized = serde_json::to_string(&payload).context("serialize mpv command")?;
    send_ipc_command_inner(path, &serialized)
}

#[cfg(unix)]
fn send_ipc_command_inner(path: &str, serialized: &str) -> Result<()> {
    let mut stream =
        UnixStream::connect(path).with_context(|| format!("connect to mpv IPC socket {path}"))?;
    stream
        .write_all(serialized.as_bytes())
        .context("write mpv IPC command")?;
    stream
        .write_all(b"\n")
        .context("write mpv IPC command terminator")?;
    Ok(())
}

#[cfg(not(unix))]
fn send_ipc_command_inner(_path: &str, _serialized: &str) -> Result<()> {
    Err(anyhow!("video controls are not supported on this platform"))
}

#[cfg(unix)]
fn unique_ipc_path() -> Option<String> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let mut path = std::env::temp_dir();
    path.push(format!("reels-mpv-{}-{suffix}.sock", std::process::id()));
    Some(path.to_string_lossy().to_string())
}

#[cfg(not(unix))]
fn unique_ipc_path() -> Option<String> {
    None
}

#[cfg(unix)]
fn cleanup_ipc_path(path: &str) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path, error = %err, "failed to remove mpv ipc path");
        }
    }
}

#[cfg(not(unix))]
fn cleanup_ipc_path(_path: &str) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Author;

    fn source() -> VideoSource {
        VideoSource {
            playback_url: "https://cdn.test/a.mp4".into(),
            label: "@stoa · a".into(),
        }
    }

    #[test]
    fn source_from_post_sanitizes_urls() {
        let post = Post {
            id: "a".into(),
            video_url: " https://cdn.test/a.mp4?x=1&amp;y=2 ".into(),
            thumbnail_url: String::new(),
            description: None,
            likes: 0,
            comments: 0,
            author: Author {
                name: "stoa".into(),
                avatar_url: String::new(),
            },
        };
        let source = VideoSource::from_post(&post).unwrap();
        assert_eq!(source.playback_url, "https://cdn.test/a.mp4?x=1&y=2");
        assert_eq!(source.label, "@stoa · a");
    }

    #[test]
    fn empty_video_url_has_no_source() {
        let post = Post {
            id: "a".into(),
            video_url: "  ".into(),
            thumbnail_url: String::new(),
            description: None,
            likes: 0,
            comments: 0,
            author: Author {
                name: String::new(),
                avatar_url: String::new(),
            },
        };
        assert!(VideoSource::from_post(&post).is_none());
    }

    #[test]
    fn launch_args_loop_stretch_and_carry_initial_state() {
        let args = launch_args(
            &MpvOptions::default(),
            &source(),
            true,
            false,
            Some("/tmp/reels.sock"),
        );
        assert_eq!(args[0], "https://cdn.test/a.mp4");
        for expected in [
            "--loop-file=inf",
            "--keepaspect=no",
            "--pause=yes",
            "--mute=no",
            "--input-ipc-server=/tmp/reels.sock",
            "--force-media-title=@stoa · a",
        ] {
            assert!(args.iter().any(|arg| arg == expected), "missing {expected}");
        }
    }

    #[test]
    fn parses_buffering_changes() {
        let line = br#"{"event":"property-change","id":1,"name":"paused-for-cache","data":true}"#;
        assert_eq!(parse_ipc_event(line), Some(PlaybackEvent::Buffering(true)));
        let line = br#"{"event":"property-change","id":1,"name":"paused-for-cache","data":false}"#;
        assert_eq!(parse_ipc_event(line), Some(PlaybackEvent::Buffering(false)));
    }

    #[test]
    fn parses_playback_errors_and_ignores_noise() {
        let line = br#"{"event":"end-file","reason":"error","file_error":"loading failed"}"#;
        assert_eq!(
            parse_ipc_event(line),
            Some(PlaybackEvent::Error(
                "mpv could not play file: loading failed".into()
            ))
        );
        assert_eq!(parse_ipc_event(br#"{"event":"end-file","reason":"eof"}"#), None);
        assert_eq!(parse_ipc_event(br#"{"request_id":0,"error":"success"}"#), None);
        assert_eq!(parse_ipc_event(b"not json"), None);
    }

    #[test]
    fn property_commands_use_set_property() {
        assert_eq!(
            command_payload(VideoCommand::SetPaused(true)),
            json!(["set_property", "pause", true])
        );
        assert_eq!(
            command_payload(VideoCommand::SetMuted(false)),
            json!(["set_property", "mute", false])
        );
    }

    #[test]
    fn events_from_a_stopped_session_are_dropped() {
        let (kill_tx, _kill_rx) = bounded(1);
        let (events_tx, events_rx) = unbounded();
        let mut player = MpvPlayer::new(MpvOptions::default());
        player.session = Some(Session {
            kill_tx,
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
            ipc_path: None,
            events_rx,
        });

        events_tx.send(PlaybackEvent::Buffering(true)).unwrap();
        assert_eq!(player.poll_events(), vec![PlaybackEvent::Buffering(true)]);

        player.stop();
        assert!(events_tx.send(PlaybackEvent::Buffering(false)).is_err());
        assert!(player.poll_events().is_empty());
    }

    #[test]
    fn controls_without_a_loaded_video_fail() {
        let mut player = MpvPlayer::new(MpvOptions::default());
        assert!(player.set_paused(true).is_err());
        assert!(player.poll_events().is_empty());
    }
}
