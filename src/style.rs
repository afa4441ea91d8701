//! Style resolver – maps inline styles and Tailwind-like utility classes used
//! by the label template to a flat [`ComputedStyle`] consumed by the layout
//! engine.

use std::collections::HashMap;

use crate::dom::{DomNode, ElementNode, Tag};

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,

    pub margin: Edges,
    pub padding: Edges,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    /// `uppercase` transform, applied when text is laid out.
    pub uppercase: bool,

    pub background_color: Color,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_wrap: FlexWrap::NoWrap,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            width: Dimension::Auto,
            height: Dimension::Auto,
            margin: Edges::default(),
            padding: Edges::default(),
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: 12.0,
            font_weight: FontWeight::Normal,
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.3,
            text_decoration: TextDecoration::None,
            uppercase: false,
            background_color: Color::TRANSPARENT,
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Inline,
    InlineBlock,
    TableRow,
    TableCell,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexWrap {
    NoWrap,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
    SpaceAround,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

/// Per-side lengths in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub const fn all(v: f32) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    /// Every side widened by `by` (e.g. a border).
    pub fn grown(self, by: f32) -> Self {
        Self {
            top: self.top + by,
            right: self.right + by,
            bottom: self.bottom + by,
            left: self.left + by,
        }
    }

    /// `[top, right, bottom, left]`.
    pub fn to_array(self) -> [f32; 4] {
        [self.top, self.right, self.bottom, self.left]
    }

    /// Set the sides named by a Tailwind side suffix: "" (all), "x", "y",
    /// "t", "r", "b" or "l".
    fn set_sides(&mut self, sides: &str, v: f32) {
        match sides {
            "" => *self = Self::all(v),
            "x" => {
                self.left = v;
                self.right = v;
            }
            "y" => {
                self.top = v;
                self.bottom = v;
            }
            "t" => self.top = v,
            "r" => self.right = v,
            "b" => self.bottom = v,
            "l" => self.left = v,
            _ => {}
        }
    }

    /// CSS 1/2/4-value shorthand.
    fn from_shorthand(val: &str) -> Option<Self> {
        let parts: Vec<f32> = val.split_whitespace().filter_map(parse_px).collect();
        match parts.as_slice() {
            [all] => Some(Self::all(*all)),
            [vertical, horizontal] => Some(Self {
                top: *vertical,
                right: *horizontal,
                bottom: *vertical,
                left: *horizontal,
            }),
            [top, right, bottom, left] => Some(Self {
                top: *top,
                right: *right,
                bottom: *bottom,
                left: *left,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }
}

/// Tailwind colour subset available to templates.
const PALETTE: &[(&str, Color)] = &[
    ("black", Color::BLACK),
    ("white", Color::WHITE),
    ("gray-100", Color::rgb(0.953, 0.957, 0.961)),
    ("gray-200", Color::rgb(0.898, 0.906, 0.922)),
    ("gray-300", Color::rgb(0.831, 0.843, 0.871)),
    ("gray-500", Color::rgb(0.424, 0.447, 0.502)),
    ("gray-700", Color::rgb(0.216, 0.255, 0.318)),
    ("gray-900", Color::rgb(0.067, 0.094, 0.153)),
    ("red-700", Color::rgb(0.725, 0.110, 0.110)),
    ("blue-700", Color::rgb(0.102, 0.306, 0.827)),
];

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element, inheriting text properties from its parent.
pub fn resolve_style(element: &ElementNode, parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut style = base_style_for_tag(&element.tag);

    if let Some(p) = parent {
        style.font_size = p.font_size;
        style.color = p.color;
        style.text_align = p.text_align;
        style.line_height = p.line_height;
        style.uppercase = p.uppercase;
        // <th> keeps its own bold default.
        if element.tag != Tag::Th {
            style.font_weight = p.font_weight;
        }
    }

    for class in element.classes() {
        apply_tailwind_class(&mut style, class);
    }

    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline);
    }

    style
}

/// Default styles based on tag semantics.
fn base_style_for_tag(tag: &Tag) -> ComputedStyle {
    let mut s = ComputedStyle::default();
    match tag {
        Tag::P => s.margin.bottom = 2.0,
        Tag::Table => {
            s.border_width = 1.0;
        }
        Tag::Tr => {
            s.display = Display::TableRow;
        }
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            s.padding = Edges {
                top: 3.0,
                right: 4.0,
                bottom: 3.0,
                left: 4.0,
            };
            s.border_width = 1.0;
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
                s.background_color = Color::rgb(0.93, 0.93, 0.93);
            }
        }
        Tag::Span | Tag::Br => {
            s.display = Display::Inline;
        }
        Tag::Img => {
            s.display = Display::InlineBlock;
        }
        Tag::Div | Tag::Body | Tag::Html => {}
        Tag::Head | Tag::Unknown(_) => {
            s.display = Display::None;
        }
    }
    s
}

/// Apply a single Tailwind utility class.
fn apply_tailwind_class(s: &mut ComputedStyle, class: &str) {
    match class {
        // Display
        "flex" => s.display = Display::Flex,
        "block" => s.display = Display::Block,
        "inline" => s.display = Display::Inline,
        "hidden" => s.display = Display::None,

        "flex-row" => s.flex_direction = FlexDirection::Row,
        "flex-col" => s.flex_direction = FlexDirection::Column,
        "flex-wrap" => s.flex_wrap = FlexWrap::Wrap,
        "flex-grow" | "grow" => s.flex_grow = 1.0,
        "flex-1" => {
            s.flex_grow = 1.0;
            s.flex_shrink = 1.0;
        }
        "shrink-0" => s.flex_shrink = 0.0,

        "justify-start" => s.justify_content = JustifyContent::Start,
        "justify-end" => s.justify_content = JustifyContent::End,
        "justify-center" => s.justify_content = JustifyContent::Center,
        "justify-between" => s.justify_content = JustifyContent::SpaceBetween,
        "justify-around" => s.justify_content = JustifyContent::SpaceAround,

        "items-start" => s.align_items = AlignItems::Start,
        "items-end" => s.align_items = AlignItems::End,
        "items-center" => s.align_items = AlignItems::Center,
        "items-stretch" => s.align_items = AlignItems::Stretch,

        "font-bold" => s.font_weight = FontWeight::Bold,
        "font-normal" => s.font_weight = FontWeight::Normal,
        "underline" => s.text_decoration = TextDecoration::Underline,
        "uppercase" => s.uppercase = true,

        "text-left" => s.text_align = TextAlign::Left,
        "text-center" => s.text_align = TextAlign::Center,
        "text-right" => s.text_align = TextAlign::Right,

        // Label-scale type ramp
        "text-2xs" => s.font_size = 8.0,
        "text-xs" => s.font_size = 10.0,
        "text-sm" => s.font_size = 12.0,
        "text-base" => s.font_size = 14.0,
        "text-lg" => s.font_size = 16.0,
        "text-xl" => s.font_size = 20.0,

        "w-full" => s.width = Dimension::Percent(100.0),
        "w-auto" => s.width = Dimension::Auto,
        "w-1/2" => s.width = Dimension::Percent(50.0),
        "w-1/3" => s.width = Dimension::Percent(33.333),
        "w-2/3" => s.width = Dimension::Percent(66.666),

        "border" => s.border_width = 1.0,
        "border-2" => s.border_width = 2.0,
        "border-0" => s.border_width = 0.0,

        _ => {
            try_parse_spacing_class(s, class);
            try_parse_color_class(s, class);
            try_parse_numeric_class(s, class);
        }
    }
}

fn try_parse_spacing_class(s: &mut ComputedStyle, class: &str) {
    // p-{n}, px-{n}, mt-{n}, ...  (1 unit = 4px)
    let Some((prefix, units)) = class.rsplit_once('-') else {
        return;
    };
    let Ok(units) = units.parse::<f32>() else {
        return;
    };
    let (edges, sides) = if let Some(sides) = prefix.strip_prefix('p') {
        (&mut s.padding, sides)
    } else if let Some(sides) = prefix.strip_prefix('m') {
        (&mut s.margin, sides)
    } else {
        return;
    };
    edges.set_sides(sides, units * 4.0);
}

fn try_parse_color_class(s: &mut ComputedStyle, class: &str) {
    let (kind, name) = match class.split_once('-') {
        Some(parts) => parts,
        None => return,
    };
    let Some(color) = PALETTE.iter().find(|(n, _)| *n == name).map(|(_, c)| *c) else {
        return;
    };
    match kind {
        "text" => s.color = color,
        "bg" => s.background_color = color,
        "border" => s.border_color = color,
        _ => {}
    }
}

/// `gap-{n}`, `w-{n}`, `h-{n}` on the 4px grid.
fn try_parse_numeric_class(s: &mut ComputedStyle, class: &str) {
    let Some((prefix, rest)) = class.split_once('-') else {
        return;
    };
    let Ok(v) = rest.parse::<f32>() else {
        return;
    };
    match prefix {
        "gap" => s.gap = v * 4.0,
        "w" => s.width = Dimension::Px(v * 4.0),
        "h" => s.height = Dimension::Px(v * 4.0),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Inline style parsing (limited subset)
// ---------------------------------------------------------------------------

fn apply_inline_style(s: &mut ComputedStyle, style_str: &str) {
    for decl in style_str.split(';') {
        if let Some((prop, val)) = decl.split_once(':') {
            apply_css_property(s, prop.trim(), val.trim());
        }
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    match prop {
        "display" => {
            s.display = match val {
                "flex" => Display::Flex,
                "block" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match val {
                "row" => FlexDirection::Row,
                "column" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "font-size" => {
            if let Some(px) = parse_px(val) {
                s.font_size = px;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "color" => {
            if let Some(c) = Color::from_hex(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::from_hex(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "width" => s.width = parse_dimension(val),
        "height" => s.height = parse_dimension(val),
        "margin" => s.margin = Edges::from_shorthand(val).unwrap_or(s.margin),
        "margin-top" => set_px(&mut s.margin.top, val),
        "margin-right" => set_px(&mut s.margin.right, val),
        "margin-bottom" => set_px(&mut s.margin.bottom, val),
        "margin-left" => set_px(&mut s.margin.left, val),
        "padding" => s.padding = Edges::from_shorthand(val).unwrap_or(s.padding),
        "padding-top" => set_px(&mut s.padding.top, val),
        "padding-right" => set_px(&mut s.padding.right, val),
        "padding-bottom" => set_px(&mut s.padding.bottom, val),
        "padding-left" => set_px(&mut s.padding.left, val),
        "border-width" | "border" => set_px(&mut s.border_width, val),
        "border-color" => {
            if let Some(c) = Color::from_hex(val) {
                s.border_color = c;
            }
        }
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(px) = parse_px(val) {
                s.line_height = px / s.font_size;
            }
        }
        "gap" => set_px(&mut s.gap, val),
        "letter-case" | "text-transform" => s.uppercase = val == "uppercase",
        _ => {}
    }
}

fn set_px(target: &mut f32, val: &str) {
    if let Some(px) = parse_px(val) {
        *target = px;
    }
}

fn parse_px(s: &str) -> Option<f32> {
    s.trim().trim_end_matches("px").trim().parse().ok()
}

fn parse_dimension(s: &str) -> Dimension {
    let s = s.trim();
    if s == "auto" {
        Dimension::Auto
    } else if let Some(pct) = s.strip_suffix('%') {
        pct.parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_px(s).map(Dimension::Px).unwrap_or(Dimension::Auto)
    }
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Original attributes (image `src`, etc.)
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// Build a styled tree from a DOM tree, resolving styles top-down.
pub fn build_styled_tree(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style);
                let children = build_styled_tree(&e.children, Some(&style));
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if text.trim().is_empty() {
                    continue;
                }
                // Text renders inline: box-model properties of the parent
                // must not be inherited.
                let base = parent_style.cloned().unwrap_or_default();
                let style = ComputedStyle {
                    font_size: base.font_size,
                    font_weight: base.font_weight,
                    color: base.color,
                    text_align: base.text_align,
                    line_height: base.line_height,
                    text_decoration: base.text_decoration,
                    uppercase: base.uppercase,
                    ..ComputedStyle::default()
                };
                result.push(StyledNode::Text {
                    text: text.clone(),
                    style,
                });
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    #[test]
    fn tailwind_padding() {
        let mut s = ComputedStyle::default();
        apply_tailwind_class(&mut s, "p-2");
        assert_eq!(s.padding, Edges::all(8.0));
        apply_tailwind_class(&mut s, "mx-1");
        assert_eq!((s.margin.left, s.margin.right, s.margin.top), (4.0, 4.0, 0.0));
    }

    #[test]
    fn inline_style_font_size_and_colour() {
        let mut s = ComputedStyle::default();
        apply_inline_style(&mut s, "font-size: 24px; color: #ff0000");
        assert_eq!(s.font_size, 24.0);
        assert!((s.color.r - 1.0).abs() < 0.01);
    }

    #[test]
    fn shorthand_padding_two_values() {
        let mut s = ComputedStyle::default();
        apply_inline_style(&mut s, "padding: 4px 8px");
        assert_eq!(s.padding.to_array(), [4.0, 8.0, 4.0, 8.0]);
    }

    #[test]
    fn palette_classes() {
        let mut s = ComputedStyle::default();
        apply_tailwind_class(&mut s, "bg-gray-100");
        apply_tailwind_class(&mut s, "border-gray-700");
        assert_eq!(s.background_color, Color::rgb(0.953, 0.957, 0.961));
        assert_eq!(s.border_color, Color::rgb(0.216, 0.255, 0.318));
    }

    #[test]
    fn text_inherits_typography_not_box_model() {
        let dom = parse_html(r#"<div class="text-sm font-bold p-2 bg-gray-100 border">AWB</div>"#);
        let styled = build_styled_tree(&dom, None);
        let StyledNode::Element { children, .. } = &styled[0] else {
            panic!("Expected element");
        };
        let StyledNode::Text { style, .. } = &children[0] else {
            panic!("Expected text");
        };
        assert_eq!(style.font_size, 12.0);
        assert_eq!(style.font_weight, FontWeight::Bold);
        assert_eq!(style.padding, Edges::default());
        assert_eq!(style.border_width, 0.0);
        assert!(style.background_color.is_transparent());
    }

    #[test]
    fn color_from_hex() {
        let c = Color::from_hex("#ff8800").unwrap();
        assert!((c.r - 1.0).abs() < 0.01);
        assert!((c.g - 0.533).abs() < 0.01);
        assert_eq!(Color::from_hex("#000"), Some(Color::BLACK));
    }
}
