//! Output arbiter
//!
//! All audible output funnels through a single FIFO worker thread, so a
//! response and a timer alert never talk over each other. cpal streams
//! are not `Send`, so the output device lives on the worker thread and
//! callers only hand it MP3 bytes.
//!
//! Response audio carries the owning task's cancellation flag: if the
//! flag is set while the item is still queued, the item is skipped
//! entirely; if it is set mid-play, playback stops early. Alert audio
//! carries no flag and always plays.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::Result;
use crate::voice::AudioPlayback;

enum SpeakItem {
    Play {
        mp3: Vec<u8>,
        cancel: Option<Arc<AtomicBool>>,
    },
    Shutdown,
}

/// Serializes all speaker output through one playback thread
pub struct Speaker {
    tx: Sender<SpeakItem>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Speaker {
    /// Spawn the playback worker thread.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the worker thread cannot be spawned. A
    /// missing output device is reported from the worker at play time,
    /// not here.
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = channel();

        let handle = std::thread::Builder::new()
            .name("speaker".to_string())
            .spawn(move || playback_loop(&rx))?;

        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue response audio tied to a command task. Skipped or stopped
    /// early if the task's cancellation flag is set.
    pub fn say(&self, mp3: Vec<u8>, cancel: Arc<AtomicBool>) {
        if self
            .tx
            .send(SpeakItem::Play {
                mp3,
                cancel: Some(cancel),
            })
            .is_err()
        {
            tracing::warn!("speaker thread gone, dropping response audio");
        }
    }

    /// Queue alert audio. Alerts are never cancelled or dropped.
    pub fn alert(&self, mp3: Vec<u8>) {
        if self.tx.send(SpeakItem::Play { mp3, cancel: None }).is_err() {
            tracing::warn!("speaker thread gone, dropping alert audio");
        }
    }

    /// Drain the queue and stop the worker. Items queued before this
    /// call still play; alerts are not lost on shutdown.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SpeakItem::Shutdown);
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("speaker thread panicked");
            }
        }
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn playback_loop(rx: &Receiver<SpeakItem>) {
    let playback = match AudioPlayback::new() {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::error!(error = %e, "no output device, audio will be discarded");
            None
        }
    };

    while let Ok(item) = rx.recv() {
        match item {
            SpeakItem::Play { mp3, cancel } => {
                // A cancelled task's queued audio never starts
                if let Some(flag) = &cancel {
                    if flag.load(Ordering::Relaxed) {
                        tracing::debug!("skipping cancelled queued audio");
                        continue;
                    }
                }

                if let Some(playback) = &playback {
                    if let Err(e) = playback.play_mp3(&mp3, cancel.as_ref()) {
                        tracing::error!(error = %e, "playback failed");
                    }
                }
            }
            SpeakItem::Shutdown => break,
        }
    }

    tracing::debug!("speaker thread exiting");
}
