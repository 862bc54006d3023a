//! UI Theme Module - color palette and style helpers
//!
//! Palette tokens rather than hard-coded colors, so every panel, the footer
//! and the key hints stay consistent.

use ratatui::style::{Color, Modifier, Style};

use promviz_core::panels::PanelView;

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Unfocused panel border
    pub panel_border: Color,
    /// Primary text color
    pub text: Color,
    /// Dimmed text (time spans, secondary info)
    pub text_dim: Color,
    /// Muted text (placeholders)
    pub text_muted: Color,
    /// Focused panel border and title
    pub accent: Color,
    /// Latest value readout
    pub highlight: Color,
    /// Plot line
    pub plot: Color,
    /// Per-query failures
    pub error: Color,
    /// Key hint text
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(220, 180, 100), // Amber
            highlight: Color::Rgb(220, 180, 100),
            plot: Color::Rgb(79, 193, 255), // Light blue
            error: Color::Rgb(244, 135, 113), // Coral red
            key_hint: Color::Rgb(206, 145, 120), // Soft orange
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    /// Border style for a panel
    pub fn border_style(&self, focused: bool) -> Style {
        if focused {
            Style::default().fg(self.palette.accent)
        } else {
            Style::default().fg(self.palette.panel_border)
        }
    }

    /// Title style for a panel
    pub fn title_style(&self, focused: bool) -> Style {
        if focused {
            Style::default()
                .fg(self.palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.palette.text)
        }
    }

    /// Body style for each kind of panel content
    pub fn view_style(&self, view: &PanelView<'_>) -> Style {
        match view {
            PanelView::Initializing | PanelView::NoData => Style::default().fg(self.palette.text_muted),
            PanelView::Error(_) => Style::default().fg(self.palette.error),
            PanelView::Graph(_) => Style::default().fg(self.palette.plot),
        }
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

/// Get the default theme
pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

/// Convenience re-exports for common use cases
pub mod styles {
    use super::*;

    pub fn border(focused: bool) -> Style {
        theme().border_style(focused)
    }

    pub fn title(focused: bool) -> Style {
        theme().title_style(focused)
    }

    pub fn view(view: &PanelView<'_>) -> Style {
        theme().view_style(view)
    }

    pub fn current_value() -> Style {
        Style::default()
            .fg(theme().palette.highlight)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text() -> Style {
        Style::default().fg(theme().palette.text)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(theme().palette.text_dim)
    }

    pub fn key_hint() -> Style {
        Style::default().fg(theme().palette.key_hint)
    }
}
