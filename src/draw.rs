//! Draw commands and the tag-keyed annotation surface they are issued to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const ORANGE: Color = Color::rgb(255, 165, 0);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Alpha channel for an opacity given in percent.
    pub fn alpha(opacity: u8) -> u8 {
        (opacity.min(100) as u32 * 255 / 100) as u8
    }
}

impl FromStr for Color {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "white" => return Ok(Color::WHITE),
            "black" => return Ok(Color::BLACK),
            "red" => return Ok(Color::RED),
            "orange" => return Ok(Color::ORANGE),
            "yellow" => return Ok(Color::YELLOW),
            _ => {}
        }

        let hex = s
            .strip_prefix('#')
            .filter(|h| h.len() == 6 && h.is_ascii())
            .ok_or_else(|| ConfigError::InvalidColor(s.to_string()))?;
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| ConfigError::InvalidColor(s.to_string()))
        };
        Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Color {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dash,
    Dot,
    DashDot,
}

impl FromStr for LineStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "solid" => Ok(LineStyle::Solid),
            "dash" => Ok(LineStyle::Dash),
            "dot" => Ok(LineStyle::Dot),
            "dash_dot" | "dashdot" => Ok(LineStyle::DashDot),
            _ => Err(ConfigError::InvalidLineStyle(s.to_string())),
        }
    }
}

impl fmt::Display for LineStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LineStyle::Solid => "solid",
            LineStyle::Dash => "dash",
            LineStyle::Dot => "dot",
            LineStyle::DashDot => "dash_dot",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TextPosition::TopLeft => "top_left",
            TextPosition::TopRight => "top_right",
            TextPosition::BottomLeft => "bottom_left",
            TextPosition::BottomRight => "bottom_right",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawKind {
    HorizontalLine {
        price: f64,
    },
    VerticalLine {
        at: DateTime<Utc>,
    },
    FixedText {
        position: TextPosition,
        text: String,
        font_size: u32,
        background: Color,
    },
}

impl DrawKind {
    pub fn name(&self) -> &'static str {
        match self {
            DrawKind::HorizontalLine { .. } => "horizontal_line",
            DrawKind::VerticalLine { .. } => "vertical_line",
            DrawKind::FixedText { .. } => "fixed_text",
        }
    }
}

/// One annotation. `tag` is the identity on the drawing surface: issuing a
/// command with an existing tag replaces the annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub tag: String,
    pub kind: DrawKind,
    pub color: Color,
    /// Percent, 0..=100.
    pub opacity: u8,
    pub style: LineStyle,
    pub thickness: u32,
}

/// What the surface was told to do since the last drain.
#[derive(Debug, Clone, PartialEq)]
pub enum Issued {
    Draw(DrawCommand),
    Remove(String),
}

impl Issued {
    pub fn tag(&self) -> &str {
        match self {
            Issued::Draw(command) => &command.tag,
            Issued::Remove(tag) => tag,
        }
    }
}

/// Stroke settings shared by all lines of one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSpec {
    pub color: Color,
    pub opacity: u8,
    pub style: LineStyle,
    pub thickness: u32,
}

impl Default for LineSpec {
    fn default() -> Self {
        LineSpec {
            color: Color::WHITE,
            opacity: 100,
            style: LineStyle::Solid,
            thickness: 1,
        }
    }
}

impl LineSpec {
    pub fn command(&self, tag: impl Into<String>, kind: DrawKind) -> DrawCommand {
        DrawCommand {
            tag: tag.into(),
            kind,
            color: self.color,
            opacity: self.opacity,
            style: self.style,
            thickness: self.thickness,
        }
    }
}

pub trait Canvas: Send {
    fn draw(&mut self, command: DrawCommand);
    fn remove(&mut self, tag: &str);
    fn clear(&mut self);
    fn contains(&self, tag: &str) -> bool;
}

/// In-memory surface. Keeps the current annotation per tag and the draws and
/// removals issued since the last [`AnnotationCanvas::drain_issued`].
#[derive(Debug, Default)]
pub struct AnnotationCanvas {
    objects: BTreeMap<String, DrawCommand>,
    issued: Vec<Issued>,
}

impl AnnotationCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<&DrawCommand> {
        self.objects.get(tag)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn drain_issued(&mut self) -> Vec<Issued> {
        std::mem::take(&mut self.issued)
    }
}

impl Canvas for AnnotationCanvas {
    fn draw(&mut self, command: DrawCommand) {
        self.issued.push(Issued::Draw(command.clone()));
        self.objects.insert(command.tag.clone(), command);
    }

    /// Unknown tags are ignored and issue nothing.
    fn remove(&mut self, tag: &str) {
        if self.objects.remove(tag).is_some() {
            self.issued.push(Issued::Remove(tag.to_string()));
        }
    }

    fn clear(&mut self) {
        let objects = std::mem::take(&mut self.objects);
        self.issued.extend(objects.into_keys().map(Issued::Remove));
    }

    fn contains(&self, tag: &str) -> bool {
        self.objects.contains_key(tag)
    }
}
