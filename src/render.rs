use crate::map::MarkerHandle;
use crate::types::{Details, Workout};
use std::collections::HashMap;
use std::fmt::Write as _;

pub fn popup_content(w: &Workout) -> String {
    format!("{} {}", w.kind().emoji(), w.description())
}

/// The `<li>` entry shown in the workout list.
pub fn list_item_html(w: &Workout) -> String {
    let kind = w.kind();
    let mut html = format!(
        r#"<li class="workout workout--{kind}" data-id="{id}">
  <h2 class="workout__title">{title}</h2>
  <span class="trash"><i class="fa-solid fa-trash icons-fa"></i></span>
"#,
        id = w.id(),
        title = escape(w.description()),
    );

    detail(&mut html, kind.emoji(), &w.distance().to_string(), "km");
    detail(&mut html, "⏱", &w.duration().to_string(), "min");

    match *w.details() {
        Details::Running { cadence, pace } => {
            detail(&mut html, "⚡️", &format!("{pace:.1}"), "min/km");
            detail(&mut html, "🦶🏼", &cadence.to_string(), "spm");
        }
        Details::Cycling {
            elevation_gain,
            speed,
        } => {
            detail(&mut html, "⚡️", &format!("{speed:.1}"), "km/h");
            detail(&mut html, "⛰", &elevation_gain.to_string(), "m");
        }
    }

    html.push_str("</li>\n");
    html
}

fn detail(html: &mut String, icon: &str, value: &str, unit: &str) {
    let _ = write!(
        html,
        r#"  <div class="workout__details">
    <span class="workout__icon">{icon}</span>
    <span class="workout__value">{value}</span>
    <span class="workout__unit">{unit}</span>
  </div>
"#
    );
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListNode {
    pub id: String,
    pub html: String,
}

/// Rendered workout list. New entries go right after the form, so the
/// most recently rendered entry is first.
#[derive(Debug, Default, Clone)]
pub struct ListView {
    nodes: Vec<ListNode>,
}

impl ListView {
    pub fn insert_after_form(&mut self, w: &Workout) {
        self.nodes.insert(
            0,
            ListNode {
                id: w.id().to_string(),
                html: list_item_html(w),
            },
        );
    }

    /// Drops the oldest node rendered for `id`.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.nodes.iter().rposition(|n| n.id == id) else {
            return false;
        };
        self.nodes.remove(pos);
        true
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn nodes(&self) -> &[ListNode] {
        &self.nodes
    }

    pub fn ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Markers drawn for one id, in the order their workouts appear in the list.
/// More than one only when ids collide.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ViewEntry {
    pub markers: Vec<MarkerHandle>,
}

/// Workout id to what is drawn for it.
pub type ViewIndex = HashMap<String, ViewEntry>;
