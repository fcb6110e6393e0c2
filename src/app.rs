use std::path::PathBuf;
use std::time::{Duration, Instant};

use ratatui::layout::Rect;
use ratatui::widgets::{Paragraph, Wrap};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::export;
use crate::ui;
use crate::shadow::{ShadowClient, UNREACHABLE_REPLY};
use crate::transcript::{export_date, Sender, Transcript};

/// How long the copy button reads "Copied!"
pub const COPIED_LABEL_DURATION: Duration = Duration::from_secs(2);
const NOTICE_DURATION: Duration = Duration::from_secs(4);

/// Export popup state. Holds a snapshot of the transcript taken when opened.
#[derive(Debug, Clone)]
pub struct ExportView {
    pub text: String,
    pub scroll: u16,
    pub copied_at: Option<Instant>,
    // Text pane size (updated during render)
    pub text_width: u16,
    pub text_height: u16,
}

impl ExportView {
    fn new(text: String) -> Self {
        Self {
            text,
            scroll: 0,
            copied_at: None,
            text_width: 0,
            text_height: 0,
        }
    }

    /// Furthest scroll that still fills the pane. Before the first render
    /// only the last logical line is known to exist.
    pub fn max_scroll(&self) -> u16 {
        if self.text_width == 0 {
            return self.text.lines().count().saturating_sub(1) as u16;
        }

        let wrapped = Paragraph::new(self.text.as_str())
            .wrap(Wrap { trim: false })
            .line_count(self.text_width);
        (wrapped as u16).saturating_sub(self.text_height.max(1))
    }

    pub fn scroll_by(&mut self, delta: i32) {
        self.scroll = if delta < 0 {
            self.scroll.saturating_sub(delta.unsigned_abs() as u16)
        } else {
            self.scroll.saturating_add(delta as u16).min(self.max_scroll())
        };
    }

    pub fn copy_label(&self) -> &'static str {
        match self.copied_at {
            Some(at) if at.elapsed() < COPIED_LABEL_DURATION => "Copied!",
            _ => "Copy",
        }
    }
}

pub struct App {
    pub should_quit: bool,

    // Conversation
    pub transcript: Transcript,
    pub client: ShadowClient,

    // Input field
    pub input: String,
    pub input_cursor: usize,

    // Waiting indicator and the one reply in flight
    pub waiting: bool,
    pub reply_task: Option<JoinHandle<String>>,
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Chat scroll state (sizes updated during render)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Export popup
    pub export: Option<ExportView>,
    pub export_dir: PathBuf,

    // Transient status line message
    pub notice: Option<(String, Instant)>,

    // Areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub popup_area: Option<Rect>,
}

impl App {
    pub fn new(client: ShadowClient, export_dir: PathBuf) -> Self {
        Self {
            should_quit: false,

            transcript: Transcript::new(),
            client,

            input: String::new(),
            input_cursor: 0,

            waiting: false,
            reply_task: None,
            animation_frame: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            export: None,
            export_dir,

            notice: None,

            chat_area: None,
            popup_area: None,
        }
    }

    /// Take the trimmed contents of the input field. Whitespace-only input is
    /// left in place and yields nothing.
    pub fn submit_input(&mut self) -> Option<String> {
        let text = self.input.trim();
        if text.is_empty() {
            return None;
        }

        let text = text.to_string();
        self.input.clear();
        self.input_cursor = 0;
        Some(text)
    }

    /// Enter in the input field. Returns true when a request went out.
    ///
    /// Only one reply may be outstanding: a send while waiting is rejected and
    /// the typed text stays in the field.
    pub fn send_message(&mut self) -> bool {
        if self.reply_task.is_some() {
            debug!("reply still pending, send rejected");
            return false;
        }

        let Some(text) = self.submit_input() else {
            return false;
        };

        self.append(Sender::User, text.clone());
        self.start_query(text);
        true
    }

    fn start_query(&mut self, text: String) {
        self.set_waiting(true);
        let client = self.client.clone();
        self.reply_task = Some(tokio::spawn(async move { client.reply(&text).await }));
    }

    /// Collect the reply once its task has finished. Called from the event
    /// loop on every event and tick.
    pub async fn poll_reply(&mut self) {
        let finished = self
            .reply_task
            .as_ref()
            .is_some_and(|task| task.is_finished());
        if !finished {
            return;
        }

        if let Some(task) = self.reply_task.take() {
            let reply = match task.await {
                Ok(reply) => reply,
                Err(e) => {
                    error!(error = %e, "reply task did not complete");
                    UNREACHABLE_REPLY.to_string()
                }
            };
            self.append(Sender::Assistant, reply);
        }
        self.set_waiting(false);
    }

    pub fn set_waiting(&mut self, waiting: bool) {
        self.waiting = waiting;
        if waiting {
            self.animation_frame = 0;
        }
        self.scroll_to_bottom();
    }

    pub fn append(&mut self, sender: Sender, text: impl Into<String>) {
        self.transcript.append(sender, text);
        self.scroll_to_bottom();
    }

    pub fn reset(&mut self) {
        self.transcript.reset();
        self.chat_scroll = 0;
    }

    pub fn open_export(&mut self) {
        self.export = Some(ExportView::new(self.transcript.to_plain_text()));
    }

    pub fn close_export(&mut self) {
        self.export = None;
        self.popup_area = None;
    }

    pub fn copy_export(&mut self) {
        let Some(view) = self.export.as_mut() else {
            return;
        };

        match export::copy_to_clipboard(&view.text) {
            Ok(()) => view.copied_at = Some(Instant::now()),
            Err(e) => {
                warn!(error = %e, "clipboard copy failed");
                self.set_notice(format!("Copy failed: {e}"));
            }
        }
    }

    pub fn download_export(&mut self) {
        let Some(view) = self.export.as_ref() else {
            return;
        };

        match export::save_transcript(&self.export_dir, &view.text, export_date()) {
            Ok(path) => self.set_notice(format!("Saved {}", path.display())),
            Err(e) => {
                warn!(error = %e, dir = %self.export_dir.display(), "transcript download failed");
                self.set_notice(format!("Download failed: {e}"));
            }
        }
    }

    pub fn set_notice(&mut self, message: String) {
        self.notice = Some((message, Instant::now()));
    }

    pub fn notice_text(&self) -> Option<&str> {
        self.notice
            .as_ref()
            .filter(|(_, at)| at.elapsed() < NOTICE_DURATION)
            .map(|(message, _)| message.as_str())
    }

    /// Tick: advance the typing animation and expire transient labels
    pub fn tick(&mut self) {
        if self.waiting {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        if let Some(view) = self.export.as_mut() {
            if view.copied_at.is_some_and(|at| at.elapsed() >= COPIED_LABEL_DURATION) {
                view.copied_at = None;
            }
        }

        if self.notice_text().is_none() {
            self.notice = None;
        }
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.chat_line_count().saturating_sub(self.visible_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    /// Scroll chat so the newest message (or the typing indicator) is visible
    pub fn scroll_to_bottom(&mut self) {
        let total_lines = self.chat_line_count();
        let visible_height = self.visible_height();

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Rendered height of the chat log, wrapped the same way `ui` draws it
    fn chat_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width } else { 50 };

        let lines = Paragraph::new(ui::chat_lines(self))
            .wrap(Wrap { trim: false })
            .line_count(wrap_width);
        u16::try_from(lines).unwrap_or(u16::MAX)
    }
}
