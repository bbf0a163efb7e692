//! Turns snapshot updates into terminal output

use explore_core::agentic::chat::{ChatSnapshot, Phase, TurnId};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::io::Write as _;
use tokio::sync::watch;

/// Remembers what has already been printed so each snapshot only emits the delta.
#[derive(Debug, Default)]
pub struct Renderer {
    last_phase: Phase,
    last_error: Option<String>,
    printed: HashMap<TurnId, usize>,
    finished: HashSet<TurnId>,
    loading: Vec<String>,
    attachment_count: usize,
    attachment_error_count: usize,
}

impl Renderer {
    pub fn render(&mut self, snapshot: &ChatSnapshot) -> String {
        let mut out = String::new();

        if snapshot.phase != self.last_phase {
            if snapshot.phase.is_loading() {
                let _ = writeln!(out, "  [{}...]", snapshot.phase);
            }
            self.last_phase = snapshot.phase;
        }

        // Turns dropped by clear, edit or regenerate are forgotten.
        let present: HashSet<&TurnId> = snapshot.messages.iter().map(|t| &t.id).collect();
        self.printed.retain(|id, _| present.contains(id));
        self.finished.retain(|id| present.contains(id));

        for turn in snapshot.messages.iter().filter(|t| !t.is_user()) {
            if self.finished.contains(&turn.id) {
                continue;
            }
            let visible = turn.visible_content();
            let printed = self.printed.entry(turn.id.clone()).or_insert(0);
            if *printed == 0 && !visible.is_empty() {
                out.push_str("assistant> ");
            }
            if visible.len() > *printed {
                out.push_str(&visible[*printed..]);
                *printed = visible.len();
            }

            if !turn.is_revealing() {
                if turn.is_cancelled() {
                    out.push_str(" [cancelled]");
                }
                out.push('\n');
                for source in turn.sources() {
                    let _ = match source.page_number {
                        Some(page) => writeln!(out, "  source: {} (p. {})", source.filename, page),
                        None => writeln!(out, "  source: {}", source.filename),
                    };
                }
                self.finished.insert(turn.id.clone());
            }
        }

        if snapshot.error != self.last_error {
            if let Some(error) = &snapshot.error {
                let _ = writeln!(out, "error: {}", error);
            }
            self.last_error = snapshot.error.clone();
        }

        for filename in &snapshot.loading_attachment_filenames {
            if !self.loading.contains(filename) {
                let _ = writeln!(out, "  extracting {}...", filename);
            }
        }
        self.loading = snapshot.loading_attachment_filenames.clone();

        if snapshot.attachments.len() > self.attachment_count {
            for attachment in &snapshot.attachments[self.attachment_count..] {
                let _ = writeln!(
                    out,
                    "  attached {} ({} chars)",
                    attachment.filename,
                    attachment.extracted_text.chars().count()
                );
            }
        }
        self.attachment_count = snapshot.attachments.len();

        if snapshot.attachment_errors.len() > self.attachment_error_count {
            for error in &snapshot.attachment_errors[self.attachment_error_count..] {
                let _ = writeln!(out, "  could not attach {}: {}", error.filename, error.message);
            }
        }
        self.attachment_error_count = snapshot.attachment_errors.len();

        out
    }
}

/// Prints every published snapshot until the controller goes away.
pub async fn follow(mut rx: watch::Receiver<ChatSnapshot>) {
    let mut renderer = Renderer::default();
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        let out = renderer.render(&snapshot);
        if !out.is_empty() {
            print!("{}", out);
            let _ = std::io::stdout().flush();
        }
    }
}

/// Whole conversation, numbering user turns the way `/edit` expects.
pub fn history(snapshot: &ChatSnapshot) -> String {
    let mut out = String::new();
    let mut user_index = 0;
    for turn in snapshot.messages.iter() {
        if turn.is_user() {
            user_index += 1;
            let _ = writeln!(out, "[{}] you> {}", user_index, turn.content);
            for attachment in turn.attachments() {
                let _ = writeln!(out, "      + {}", attachment.filename);
            }
        } else {
            let marker = if turn.is_cancelled() { " [cancelled]" } else { "" };
            let _ = writeln!(out, "    assistant> {}{}", turn.visible_content(), marker);
        }
    }
    if out.is_empty() {
        out.push_str("(empty)\n");
    }
    out
}
