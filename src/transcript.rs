//! Conversation log shown in the chat pane
//!
//! The transcript is the single source of truth for what has been said. The
//! chat pane renders it and the export popup serializes it; neither reads the
//! other's output back.

use chrono::{Local, NaiveDate, Utc};

pub const GREETING: &str = "I am Shadow, the dark AI. What secrets shall we uncover today?";
pub const ASSISTANT_NAME: &str = "Shadow";
pub const USER_NAME: &str = "You";

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Sender::User => USER_NAME,
            Sender::Assistant => ASSISTANT_NAME,
        }
    }
}

/// One chat entry. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub timestamp: String,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self::at(sender, text, current_time())
    }

    pub fn at(sender: Sender, text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: timestamp.into(),
        }
    }

    /// `[HH:MM] Sender: text`
    pub fn export_line(&self) -> String {
        format!("[{}] {}: {}", self.timestamp, self.sender.label(), self.text)
    }
}

#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            messages: vec![Message::new(Sender::Assistant, GREETING)],
        }
    }

    pub fn append(&mut self, sender: Sender, text: impl Into<String>) {
        self.push(Message::new(sender, text));
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drop everything and start over with a freshly stamped greeting
    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(Message::new(Sender::Assistant, GREETING));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Plain-text export, one newline-terminated line per message
    pub fn to_plain_text(&self) -> String {
        let mut text = String::new();
        for message in &self.messages {
            text.push_str(&message.export_line());
            text.push('\n');
        }
        text
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// Local wall-clock time as zero-padded `HH:MM`
pub fn current_time() -> String {
    Local::now().format("%H:%M").to_string()
}

/// Day used to name downloads. UTC, so the name matches the ISO date a
/// browser's `toISOString()` would give.
pub fn export_date() -> NaiveDate {
    Utc::now().date_naive()
}

/// File name offered by the download action for the given day
pub fn export_file_name(date: NaiveDate) -> String {
    format!("Shadow_AI_Chat_{}.txt", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_hhmm(s: &str) -> bool {
        let bytes = s.as_bytes();
        bytes.len() == 5
            && bytes[2] == b':'
            && bytes.iter().enumerate().all(|(i, b)| i == 2 || b.is_ascii_digit())
    }

    #[test]
    fn starts_with_greeting() {
        let transcript = Transcript::new();
        assert_eq!(transcript.len(), 1);
        let greeting = &transcript.messages()[0];
        assert_eq!(greeting.sender, Sender::Assistant);
        assert_eq!(greeting.text, GREETING);
        assert!(is_hhmm(&greeting.timestamp), "bad timestamp {}", greeting.timestamp);
    }

    #[test]
    fn append_keeps_insertion_order() {
        let mut transcript = Transcript::new();
        transcript.append(Sender::User, "first");
        transcript.append(Sender::Assistant, "second");
        transcript.append(Sender::User, "third");

        let texts: Vec<&str> = transcript.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec![GREETING, "first", "second", "third"]);
        assert!(transcript.messages().iter().all(|m| is_hhmm(&m.timestamp)));
    }

    #[test]
    fn reset_leaves_only_the_greeting() {
        let mut transcript = Transcript::new();
        for i in 0..10 {
            transcript.append(Sender::User, format!("question {i}"));
            transcript.append(Sender::Assistant, format!("answer {i}"));
        }
        transcript.reset();

        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.last().map(|m| m.text.as_str()), Some(GREETING));
    }

    #[test]
    fn export_formats_each_message_on_its_own_line() {
        let mut transcript = Transcript::new();
        transcript.messages.clear();
        transcript.push(Message::at(Sender::Assistant, GREETING, "09:05"));
        transcript.push(Message::at(Sender::User, "who are you?", "09:06"));
        transcript.push(Message::at(Sender::Assistant, "A shadow.", "09:07"));

        assert_eq!(
            transcript.to_plain_text(),
            format!(
                "[09:05] Shadow: {GREETING}\n[09:06] You: who are you?\n[09:07] Shadow: A shadow.\n"
            )
        );
    }

    #[test]
    fn export_has_one_line_per_message_and_no_blank_lines() {
        let mut transcript = Transcript::new();
        for i in 0..7 {
            let sender = if i % 2 == 0 { Sender::User } else { Sender::Assistant };
            transcript.append(sender, format!("message {i}"));
        }

        let text = transcript.to_plain_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), transcript.len());
        assert!(text.ends_with('\n'));
        assert!(!text.contains("\n\n"));

        for (line, message) in lines.iter().zip(transcript.messages()) {
            let prefix = format!("[{}] {}: ", message.timestamp, message.sender.label());
            assert!(line.starts_with(&prefix), "{line:?} missing {prefix:?}");
            assert!(line.ends_with(&message.text));
        }
    }

    #[test]
    fn export_keeps_text_that_looks_like_a_timestamp() {
        let mut transcript = Transcript::new();
        transcript.messages.clear();
        transcript.push(Message::at(Sender::User, "meet at 10:30", "10:30"));

        assert_eq!(transcript.to_plain_text(), "[10:30] You: meet at 10:30\n");
    }

    #[test]
    fn export_date_is_the_utc_calendar_day() {
        let before = Utc::now().date_naive();
        let date = export_date();
        let after = Utc::now().date_naive();

        assert!(date == before || date == after);
    }

    #[test]
    fn export_file_name_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_file_name(date), "Shadow_AI_Chat_2024-03-09.txt");
    }
}
