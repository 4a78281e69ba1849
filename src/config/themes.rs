use std::collections::HashMap;

use ratatui::style::Color;
use serde::{Deserialize, Serialize};

use crate::storage::Category;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeName {
    #[default]
    Dark,
    Light,
    HighContrast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub accent: Color,
    pub muted: Color,
    pub editing: Color,
    pub alert: Color,
    pub study: Color,
    pub work: Color,
    pub personal: Color,
}

impl Palette {
    pub fn category(&self, category: Category) -> Color {
        match category {
            Category::Study => self.study,
            Category::Work => self.work,
            Category::Personal => self.personal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThemeRegistry {
    palettes: HashMap<ThemeName, Palette>,
}

impl ThemeRegistry {
    pub fn contains(&self, theme: &ThemeName) -> bool {
        self.palettes.contains_key(theme)
    }

    pub fn palette(&self, theme: &ThemeName) -> Palette {
        self.palettes
            .get(theme)
            .or_else(|| self.palettes.get(&ThemeName::Dark))
            .copied()
            .unwrap_or(DARK)
    }
}

const DARK: Palette = Palette {
    accent: Color::Cyan,
    muted: Color::Gray,
    editing: Color::Magenta,
    alert: Color::Red,
    study: Color::Blue,
    work: Color::Green,
    personal: Color::Yellow,
};

impl Default for ThemeRegistry {
    fn default() -> Self {
        let light = Palette {
            accent: Color::Blue,
            muted: Color::DarkGray,
            editing: Color::Magenta,
            alert: Color::Red,
            study: Color::Blue,
            work: Color::Green,
            personal: Color::Rgb(180, 110, 0),
        };
        let high_contrast = Palette {
            accent: Color::White,
            muted: Color::White,
            editing: Color::LightMagenta,
            alert: Color::LightRed,
            study: Color::LightCyan,
            work: Color::LightGreen,
            personal: Color::LightYellow,
        };
        let palettes = [
            (ThemeName::Dark, DARK),
            (ThemeName::Light, light),
            (ThemeName::HighContrast, high_contrast),
        ]
        .into_iter()
        .collect();
        Self { palettes }
    }
}
