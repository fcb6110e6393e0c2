use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::App;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => app.scroll_to_bottom(),
        AppEvent::Tick => app.tick(),
    }

    // Every event doubles as a chance to pick up a finished reply
    app.poll_reply().await;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any mode
    if ctrl && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }

    if app.export.is_some() {
        handle_export_key(app, key);
    } else if ctrl {
        handle_chat_shortcut(app, key);
    } else {
        handle_input_key(app, key);
    }
}

fn handle_chat_shortcut(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('l') => app.reset(),
        KeyCode::Char('e') => app.open_export(),
        KeyCode::Char('q') => app.should_quit = true,
        _ => {}
    }
}

fn handle_export_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.close_export(),
        KeyCode::Char('c') => app.copy_export(),
        KeyCode::Char('d') => app.download_export(),
        KeyCode::Char('j') | KeyCode::Down => scroll_export(app, 1),
        KeyCode::Char('k') | KeyCode::Up => scroll_export(app, -1),
        _ => {}
    }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            app.send_message();
        }
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(1) / 2),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(1) / 2),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

fn scroll_export(app: &mut App, delta: i32) {
    if let Some(view) = app.export.as_mut() {
        view.scroll_by(delta);
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    if app.export.is_some() {
        let in_popup = app.popup_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
        match mouse.kind {
            // Clicking the backdrop dismisses the popup
            MouseEventKind::Down(MouseButton::Left) if !in_popup => app.close_export(),
            MouseEventKind::ScrollDown if in_popup => scroll_export(app, 3),
            MouseEventKind::ScrollUp if in_popup => scroll_export(app, -3),
            _ => {}
        }
        return;
    }

    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    match mouse.kind {
        MouseEventKind::ScrollDown if in_chat => app.scroll_down(3),
        MouseEventKind::ScrollUp if in_chat => app.scroll_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::{app_for, settle};
    use crate::shadow::test_server;
    use crate::transcript::GREETING;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    fn click(column: u16, row: u16) -> AppEvent {
        AppEvent::Mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    async fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c))).await.unwrap();
        }
    }

    #[test]
    fn byte_index_handles_multibyte_chars() {
        let s = "héllo";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 99), s.len());
    }

    #[tokio::test]
    async fn editing_keys_move_cursor_on_char_boundaries() {
        let mut app = app_for("http://127.0.0.1:9/unused");
        type_text(&mut app, "añb").await;
        assert_eq!(app.input, "añb");
        assert_eq!(app.input_cursor, 3);

        handle_event(&mut app, key(KeyCode::Left)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Backspace)).await.unwrap();
        assert_eq!(app.input, "ab");
        assert_eq!(app.input_cursor, 1);

        handle_event(&mut app, key(KeyCode::Home)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Delete)).await.unwrap();
        assert_eq!(app.input, "b");

        handle_event(&mut app, key(KeyCode::End)).await.unwrap();
        type_text(&mut app, "!").await;
        assert_eq!(app.input, "b!");
    }

    #[tokio::test]
    async fn enter_on_blank_input_does_nothing() {
        let mut app = app_for("http://127.0.0.1:9/unused");
        type_text(&mut app, "   ").await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();

        assert_eq!(app.transcript.len(), 1);
        assert!(!app.waiting);
        assert_eq!(app.input, "   ");
    }

    #[tokio::test]
    async fn enter_sends_and_tick_collects_reply() {
        let server = test_server::spawn(200, r#"{"result":"Hello there"}"#).await;
        let mut app = app_for(&server.url);

        type_text(&mut app, "hi").await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();
        assert!(app.waiting);
        assert_eq!(app.input, "");

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while app.waiting {
                handle_event(&mut app, AppEvent::Tick).await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(app.transcript.len(), 3);
        assert_eq!(app.transcript.last().unwrap().text, "Hello there");
    }

    #[tokio::test]
    async fn ctrl_l_resets_conversation() {
        let server = test_server::spawn(200, r#"{"result":"yes"}"#).await;
        let mut app = app_for(&server.url);
        type_text(&mut app, "anything").await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();
        settle(&mut app).await;
        assert_eq!(app.transcript.len(), 3);

        handle_event(&mut app, ctrl('l')).await.unwrap();
        assert_eq!(app.transcript.len(), 1);
        assert_eq!(app.transcript.last().unwrap().text, GREETING);
    }

    #[tokio::test]
    async fn export_popup_captures_keys_until_closed() {
        let mut app = app_for("http://127.0.0.1:9/unused");
        handle_event(&mut app, ctrl('e')).await.unwrap();
        assert!(app.export.is_some());

        // Typing goes to the popup, not the input field
        handle_event(&mut app, key(KeyCode::Char('x'))).await.unwrap();
        assert_eq!(app.input, "");

        handle_event(&mut app, key(KeyCode::Esc)).await.unwrap();
        assert!(app.export.is_none());

        handle_event(&mut app, ctrl('e')).await.unwrap();
        handle_event(&mut app, key(KeyCode::Char('q'))).await.unwrap();
        assert!(app.export.is_none());
        assert!(!app.should_quit);
    }

    #[tokio::test]
    async fn clicking_outside_popup_closes_it() {
        let mut app = app_for("http://127.0.0.1:9/unused");
        handle_event(&mut app, ctrl('e')).await.unwrap();
        app.popup_area = Some(Rect::new(10, 5, 40, 10));

        handle_event(&mut app, click(20, 8)).await.unwrap();
        assert!(app.export.is_some());

        handle_event(&mut app, click(2, 2)).await.unwrap();
        assert!(app.export.is_none());
    }

    #[tokio::test]
    async fn ctrl_c_quits_even_with_popup_open() {
        let mut app = app_for("http://127.0.0.1:9/unused");
        handle_event(&mut app, ctrl('e')).await.unwrap();

        handle_event(&mut app, ctrl('c')).await.unwrap();
        assert!(app.should_quit);
    }
}
