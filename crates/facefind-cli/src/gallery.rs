//! Gallery page: the sorted grid, summary panel and detail preview.

use facefind_core::gallery::GalleryItem;
use facefind_core::{GalleryView, Match, MatchReader, Route};
use std::fmt::Write;

/// A line of user input on the gallery page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryCommand {
    /// Preview the item at this 1-based position.
    Open(usize),
    Close,
    /// Back to the capture page for another selfie.
    Back,
    Quit,
    Redraw,
}

impl GalleryCommand {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Ok(position) = input.parse::<usize>() {
            return Some(Self::Open(position));
        }
        match input.to_ascii_lowercase().as_str() {
            "c" | "close" | "x" => Some(Self::Close),
            "b" | "back" | "login" => Some(Self::Back),
            "q" | "quit" | "exit" => Some(Self::Quit),
            "" | "r" | "refresh" => Some(Self::Redraw),
            _ => None,
        }
    }
}

/// The gallery as entered from the navigation surface.
pub struct GalleryPage {
    reader: MatchReader,
    view: GalleryView,
}

impl GalleryPage {
    /// Enter the gallery, or get the route to redirect to when there is nothing to show.
    pub fn enter(mut reader: MatchReader) -> Result<Self, Route> {
        let target = Route::Gallery.resolve(&reader);
        if target != Route::Gallery {
            return Err(target);
        }
        let data = reader.get_and_mark_seen().ok_or(Route::Login)?;
        Ok(Self {
            reader,
            view: GalleryView::new(data),
        })
    }

    /// Re-sort if the shared state changed since the last look.
    pub fn sync(&mut self) -> bool {
        if !self.reader.has_changed() {
            return false;
        }
        match self.reader.get_and_mark_seen() {
            Some(data) => {
                self.view.refresh(data);
                true
            }
            None => false,
        }
    }

    pub fn view(&self) -> &GalleryView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut GalleryView {
        &mut self.view
    }

    pub fn render(&self) -> String {
        render_grid(&self.view)
    }
}

pub fn render_grid(view: &GalleryView) -> String {
    let summary = view.summary();
    let mut out = String::new();

    let _ = writeln!(out, "Face Match Results");
    let _ = writeln!(out);
    let _ = writeln!(out, "Match Summary");
    let _ = writeln!(out, "  Total Photos:      {}", summary.total_matched_photos);
    let _ = writeln!(out, "  Faces Considered:  {}", summary.total_faces_considered);
    let _ = writeln!(out, "  Threshold:         {}", summary.matching_threshold);
    let _ = writeln!(out);

    if view.is_empty() {
        let _ = writeln!(out, "  (no photos)");
    } else {
        let _ = writeln!(out, "  {:>3}  {:<14}  Photo", "#", "Confidence");
        for item in view.items() {
            let _ = writeln!(out, "{}", grid_row(&item));
        }
    }

    let _ = writeln!(out);
    let _ = write!(
        out,
        "Enter a number to preview a photo, \"c\" to close it, \"b\" for a new selfie, \"q\" to quit."
    );
    out
}

fn grid_row(item: &GalleryItem<'_>) -> String {
    format!(
        "  {:>3}  [{:<6} {:>4}]  {}",
        item.position,
        item.tier.as_str(),
        item.badge(),
        item.item.photo_url
    )
}

pub fn render_preview(position: usize, item: &Match) -> String {
    format!(
        "Match {position}: {url}\n  confidence {badge} ({tier}), face {face}",
        url = item.photo_url,
        badge = facefind_core::gallery::badge_label(item.confidence),
        tier = facefind_core::ConfidenceTier::of(item.confidence),
        face = item.face_id,
    )
}
