//! Layout engine – uses Taffy to compute flexbox layout for one label card,
//! then converts the result into a tree of [`LayoutBox`]es in label pixels.

use std::collections::HashMap;
use taffy::prelude::*;

use crate::assets::parse_data_uri;
use crate::dom::Tag;
use crate::error::{LabelError, Result};
use crate::fonts::{wrap_text, FontManager};
use crate::layout_config::{BorderStyle, ImageContent, LayoutBox, TextContent, TextLine};
use crate::style::{self, ComputedStyle, FontWeight, StyledNode};

// ---------------------------------------------------------------------------
// Intermediate layout tree
// ---------------------------------------------------------------------------

/// A positioned box in label coordinates.
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    /// Wrapped text. `inset` is the padding of a merged paragraph block:
    /// `[top, right, bottom, left]`.
    Text {
        lines: Vec<String>,
        inset: [f32; 4],
    },
    Image {
        src: String,
    },
}

fn taffy_err(e: taffy::TaffyError) -> LabelError {
    LabelError::Template(format!("layout failed: {e:?}"))
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
        }
    }

    /// Collect the text of an inline subtree. `<br>` becomes `\n`; newlines
    /// inside text nodes are plain whitespace.
    fn collect_inline_text(node: &StyledNode) -> String {
        match node {
            StyledNode::Text { text, .. } => text.replace(['\n', '\r'], " "),
            StyledNode::Element { tag: Tag::Br, .. } => "\n".to_string(),
            StyledNode::Element { children, .. } => children
                .iter()
                .map(Self::collect_inline_text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// True when every child is a text node or an inline element (span, br).
    fn all_inline(children: &[StyledNode]) -> bool {
        children.iter().all(|c| match c {
            StyledNode::Text { .. } => true,
            StyledNode::Element {
                style,
                children: gc,
                ..
            } => style.display == style::Display::Inline && Self::all_inline(gc),
        })
    }

    fn build_node(&mut self, styled: &StyledNode, parent_width: f32) -> Result<NodeId> {
        match styled {
            StyledNode::Text { text, style } => {
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                self.build_text_node(&text, style, parent_width, None)
            }
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => self.build_element_node(tag, style, children, attrs, parent_width),
        }
    }

    /// Build a text leaf. When `block` is given, the leaf stands in for a whole
    /// paragraph element and takes over its margin, padding and border.
    fn build_text_node(
        &mut self,
        text: &str,
        style: &ComputedStyle,
        parent_width: f32,
        block: Option<&ComputedStyle>,
    ) -> Result<NodeId> {
        let bold = style.font_weight == FontWeight::Bold;
        let font_size = style.font_size;
        let line_height_px = self.fonts.line_height_px(font_size, style.line_height);
        let text = if style.uppercase {
            text.to_uppercase()
        } else {
            text.to_string()
        };

        let (margin, inset, border) = match block {
            Some(b) => (
                b.margin.to_array(),
                b.padding.grown(b.border_width).to_array(),
                b.border_width,
            ),
            None => ([0.0; 4], [0.0; 4], 0.0),
        };

        let block_width = block.map(|b| b.width).unwrap_or(style::Dimension::Auto);
        let outer_width = match block_width {
            style::Dimension::Px(w) => w,
            style::Dimension::Percent(p) => parent_width * p / 100.0,
            style::Dimension::Auto => parent_width - margin[1] - margin[3],
        };
        let max_w = (outer_width - inset[1] - inset[3]).max(1.0);
        let lines = wrap_text(text.trim(), font_size, bold, max_w, self.fonts);

        let text_width = lines
            .iter()
            .map(|l| self.fonts.measure_text_width(l, font_size, bold))
            .fold(0.0f32, f32::max);
        let text_height = lines.len() as f32 * line_height_px;

        // Decorated blocks fill their parent; bare text hugs its content.
        let decorated = block.is_some_and(|b| {
            b.border_width > 0.0 || !b.background_color.is_transparent()
        });
        let (width, hugs_content) = match block_width {
            style::Dimension::Px(w) => (taffy::Dimension::Length(w), false),
            style::Dimension::Percent(p) => (taffy::Dimension::Percent(p / 100.0), false),
            style::Dimension::Auto if decorated => (taffy::Dimension::Auto, false),
            style::Dimension::Auto => (
                taffy::Dimension::Length(text_width + inset[1] + inset[3]),
                true,
            ),
        };

        let taffy_style = Style {
            size: Size {
                width,
                height: taffy::Dimension::Length(text_height + inset[0] + inset[2]),
            },
            min_size: Size {
                width: taffy::Dimension::Length(text_width + inset[1] + inset[3]),
                height: taffy::Dimension::Auto,
            },
            margin: Rect {
                top: LengthPercentageAuto::Length(margin[0]),
                right: LengthPercentageAuto::Length(margin[1]),
                bottom: LengthPercentageAuto::Length(margin[2]),
                left: LengthPercentageAuto::Length(margin[3]),
            },
            border: Rect {
                top: LengthPercentage::Length(border),
                right: LengthPercentage::Length(border),
                bottom: LengthPercentage::Length(border),
                left: LengthPercentage::Length(border),
            },
            align_self: if !hugs_content {
                None
            } else {
                match style.text_align {
                    style::TextAlign::Left => None,
                    style::TextAlign::Center => Some(taffy::AlignSelf::Center),
                    style::TextAlign::Right => Some(taffy::AlignSelf::End),
                }
            },
            flex_shrink: 0.0,
            ..Default::default()
        };

        let node = self.taffy.new_leaf(taffy_style).map_err(taffy_err)?;
        let box_style = match block {
            Some(b) => ComputedStyle {
                font_size: style.font_size,
                font_weight: style.font_weight,
                color: style.color,
                text_align: style.text_align,
                line_height: style.line_height,
                text_decoration: style.text_decoration,
                ..b.clone()
            },
            None => style.clone(),
        };
        self.node_styles.insert(node, box_style);
        self.node_content
            .insert(node, BoxContent::Text { lines, inset });
        Ok(node)
    }

    fn build_element_node(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        attrs: &HashMap<String, String>,
        parent_width: f32,
    ) -> Result<NodeId> {
        // Block elements whose children are all inline get their text merged
        // into a single wrapped text node so spans and <br> flow correctly.
        let is_paragraph = matches!(tag, Tag::P | Tag::Div);
        if is_paragraph && !children.is_empty() && Self::all_inline(children) {
            let raw: String = children.iter().map(Self::collect_inline_text).collect();
            let combined = raw
                .split('\n')
                .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join("\n");
            if !combined.trim().is_empty() {
                return self.build_text_node(&combined, style, parent_width, Some(style));
            }
        }

        // Compute the width available for children
        let my_width = match style.width {
            style::Dimension::Px(w) => w,
            style::Dimension::Percent(p) => parent_width * p / 100.0,
            style::Dimension::Auto => parent_width - style.margin.horizontal(),
        };
        let inner_width = (my_width - style.padding.grown(style.border_width).horizontal()).max(1.0);

        // For flex rows and table rows, auto-width children share what the
        // explicitly sized ones leave over.
        let is_row = *tag == Tag::Tr
            || (style.display == style::Display::Flex
                && style.flex_direction == style::FlexDirection::Row);
        let child_widths = self.child_build_widths(children, style, inner_width, is_row);

        let mut child_nodes = Vec::with_capacity(children.len());
        for (child, width) in children.iter().zip(child_widths) {
            child_nodes.push(self.build_node(child, width)?);
        }

        // Resolve Auto width/height of <img> from the intrinsic image size, so
        // that an empty flex container does not collapse to 0×0.
        let style_override = if *tag == Tag::Img
            && (matches!(style.width, style::Dimension::Auto)
                || matches!(style.height, style::Dimension::Auto))
        {
            let src = attrs.get("src").map(|s| s.as_str()).unwrap_or("");
            resolve_img_auto_dimensions(src, style, parent_width)
        } else {
            None
        };

        let effective_style = style_override.as_ref().unwrap_or(style);
        let taffy_style = self.computed_to_taffy(effective_style, tag);
        let node = self
            .taffy
            .new_with_children(taffy_style, &child_nodes)
            .map_err(taffy_err)?;
        self.node_styles.insert(node, effective_style.clone());

        if *tag == Tag::Img {
            let src = attrs.get("src").cloned().unwrap_or_default();
            self.node_content.insert(node, BoxContent::Image { src });
        }

        Ok(node)
    }

    fn child_build_widths(
        &self,
        children: &[StyledNode],
        style: &ComputedStyle,
        inner_width: f32,
        is_row: bool,
    ) -> Vec<f32> {
        if !is_row {
            return vec![inner_width; children.len()];
        }

        let elements: Vec<&ComputedStyle> = children
            .iter()
            .filter_map(|c| match c {
                StyledNode::Element { style, .. } if style.display != style::Display::None => {
                    Some(style)
                }
                _ => None,
            })
            .collect();
        let gap_total = style.gap * elements.len().saturating_sub(1) as f32;
        let fixed: f32 = elements
            .iter()
            .map(|s| match s.width {
                style::Dimension::Px(w) => w,
                style::Dimension::Percent(p) => inner_width * p / 100.0,
                style::Dimension::Auto => 0.0,
            })
            .sum();
        let auto_count = elements
            .iter()
            .filter(|s| matches!(s.width, style::Dimension::Auto))
            .count()
            .max(1);
        let share = ((inner_width - gap_total - fixed) / auto_count as f32).max(1.0);

        children
            .iter()
            .map(|c| match c {
                StyledNode::Element { style, .. } => match style.width {
                    style::Dimension::Auto => share,
                    _ => inner_width,
                },
                StyledNode::Text { .. } => share,
            })
            .collect()
    }

    fn computed_to_taffy(&self, s: &ComputedStyle, tag: &Tag) -> Style {
        let mut ts = Style::default();

        let padding = Rect {
            top: LengthPercentage::Length(s.padding.top),
            right: LengthPercentage::Length(s.padding.right),
            bottom: LengthPercentage::Length(s.padding.bottom),
            left: LengthPercentage::Length(s.padding.left),
        };
        let margin = Rect {
            top: LengthPercentageAuto::Length(s.margin.top),
            right: LengthPercentageAuto::Length(s.margin.right),
            bottom: LengthPercentageAuto::Length(s.margin.bottom),
            left: LengthPercentageAuto::Length(s.margin.left),
        };
        let border = Rect {
            top: LengthPercentage::Length(s.border_width),
            right: LengthPercentage::Length(s.border_width),
            bottom: LengthPercentage::Length(s.border_width),
            left: LengthPercentage::Length(s.border_width),
        };

        // -----------------------------------------------------------------
        // HTML table model: always use flex regardless of computed display.
        // -----------------------------------------------------------------
        match tag {
            Tag::Table => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
                ts.size.width = self.dim_to_taffy(s.width);
                ts.size.height = self.dim_to_taffy(s.height);
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.padding = padding;
                ts.margin = margin;
                ts.border = border;
                return ts;
            }
            Tag::Tr => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.align_items = Some(taffy::AlignItems::Stretch);
                ts.size.width = taffy::Dimension::Percent(1.0);
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.margin = margin;
                return ts;
            }
            Tag::Td | Tag::Th => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
                ts.flex_grow = 1.0;
                ts.flex_shrink = 1.0;
                ts.flex_basis = taffy::Dimension::Length(0.0); // equal columns
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.padding = padding;
                ts.border = border;
                return ts;
            }
            _ => {}
        }

        // Display / layout mode
        match s.display {
            style::Display::Flex => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = match s.flex_direction {
                    style::FlexDirection::Row => taffy::FlexDirection::Row,
                    style::FlexDirection::Column => taffy::FlexDirection::Column,
                };
                ts.flex_wrap = match s.flex_wrap {
                    style::FlexWrap::NoWrap => taffy::FlexWrap::NoWrap,
                    style::FlexWrap::Wrap => taffy::FlexWrap::Wrap,
                };
                ts.justify_content = Some(match s.justify_content {
                    style::JustifyContent::Start => taffy::JustifyContent::Start,
                    style::JustifyContent::End => taffy::JustifyContent::End,
                    style::JustifyContent::Center => taffy::JustifyContent::Center,
                    style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                    style::JustifyContent::SpaceAround => taffy::JustifyContent::SpaceAround,
                });
                ts.align_items = Some(match s.align_items {
                    style::AlignItems::Start => taffy::AlignItems::Start,
                    style::AlignItems::End => taffy::AlignItems::End,
                    style::AlignItems::Center => taffy::AlignItems::Center,
                    style::AlignItems::Stretch => taffy::AlignItems::Stretch,
                });
            }
            style::Display::Block
            | style::Display::TableRow
            | style::Display::TableCell
            | style::Display::InlineBlock => {
                // Block-level elements stack vertically.
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
            }
            style::Display::Inline => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.flex_wrap = taffy::FlexWrap::Wrap;
            }
            style::Display::None => {
                ts.display = taffy::Display::None;
            }
        }

        ts.size = Size {
            width: self.dim_to_taffy(s.width),
            height: self.dim_to_taffy(s.height),
        };
        // Allow flex items to compress below their natural content size
        if s.flex_shrink > 0.0 || s.flex_grow > 0.0 {
            ts.min_size.width = taffy::Dimension::Length(0.0);
        }
        if *tag == Tag::Img {
            ts.flex_shrink = 0.0;
        } else {
            ts.flex_shrink = s.flex_shrink;
        }
        ts.flex_grow = s.flex_grow;

        ts.margin = margin;
        ts.padding = padding;
        ts.border = border;
        ts.gap = Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        };

        ts
    }

    fn dim_to_taffy(&self, d: style::Dimension) -> taffy::Dimension {
        match d {
            style::Dimension::Auto => taffy::Dimension::Auto,
            style::Dimension::Px(v) => taffy::Dimension::Length(v),
            style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
        }
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox> {
        let layout = self.taffy.layout(node).map_err(taffy_err)?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)
            .map_err(taffy_err)?
            .iter()
            .map(|&child| self.extract(child, x, y))
            .collect::<Result<Vec<_>>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            style,
            content,
            children,
        })
    }
}

// ---------------------------------------------------------------------------
// Image intrinsic-size helper
// ---------------------------------------------------------------------------

/// Decode a data-URI image and return a cloned [`ComputedStyle`] with any
/// `Auto` width/height replaced by pixel values from the intrinsic size.
///
/// Returns `None` when the src cannot be decoded (the rasterizer reports
/// that) or when both dimensions are already specified.
fn resolve_img_auto_dimensions(
    src: &str,
    style: &ComputedStyle,
    parent_width: f32,
) -> Option<ComputedStyle> {
    let bytes = parse_data_uri(src).ok()?;
    let img = ::image::load_from_memory(&bytes).ok()?;
    let (px_w, px_h) = (img.width() as f32, img.height() as f32);
    if px_w == 0.0 || px_h == 0.0 {
        return None;
    }
    let aspect = px_w / px_h;

    let known_w: Option<f32> = match style.width {
        style::Dimension::Px(v) => Some(v),
        style::Dimension::Percent(p) => Some(parent_width * p / 100.0),
        style::Dimension::Auto => None,
    };
    let known_h: Option<f32> = match style.height {
        style::Dimension::Px(v) => Some(v),
        _ => None,
    };

    let mut s = style.clone();
    match (known_w, known_h) {
        (Some(w), None) => s.height = style::Dimension::Px((w / aspect).max(1.0)),
        (None, Some(h)) => s.width = style::Dimension::Px((h * aspect).max(1.0)),
        // Both Auto: intrinsic size, capped to the available width.
        (None, None) => {
            let w = px_w.min(parent_width.max(1.0));
            s.width = style::Dimension::Px(w);
            s.height = style::Dimension::Px((w / aspect).max(1.0));
        }
        (Some(_), Some(_)) => return None,
    }
    Some(s)
}

// ---------------------------------------------------------------------------
// PositionedBox → LayoutBox
// ---------------------------------------------------------------------------

/// Recursively build a [`LayoutBox`] tree. Positions are already absolute
/// within the label because `extract` accumulates offsets from the root.
fn build_layout_box(pbox: &PositionedBox, fonts: &FontManager) -> LayoutBox {
    let mut lb = LayoutBox::new(pbox.x, pbox.y, pbox.width, pbox.height);

    if !pbox.style.background_color.is_transparent() {
        lb.background_color = Some(pbox.style.background_color.to_array());
    }

    if pbox.style.border_width > 0.5 {
        lb.border = Some(BorderStyle {
            width: pbox.style.border_width,
            color: pbox.style.border_color.to_array(),
        });
    }

    match &pbox.content {
        BoxContent::Text { lines, inset } => {
            let s = &pbox.style;
            let bold = s.font_weight == FontWeight::Bold;
            let line_height = fonts.line_height_px(s.font_size, s.line_height);
            let content_width = (pbox.width - inset[1] - inset[3]).max(0.0);
            let text_lines: Vec<TextLine> = lines
                .iter()
                .enumerate()
                .map(|(i, line)| {
                    let slack = (content_width - fonts.measure_text_width(line, s.font_size, bold))
                        .max(0.0);
                    let align_offset = match s.text_align {
                        style::TextAlign::Left => 0.0,
                        style::TextAlign::Center => slack / 2.0,
                        style::TextAlign::Right => slack,
                    };
                    TextLine {
                        text: line.clone(),
                        x_offset: inset[3] + align_offset,
                        y_offset: inset[0] + i as f32 * line_height,
                    }
                })
                .collect();

            lb.text = Some(TextContent {
                lines: text_lines,
                font_size: s.font_size,
                bold,
                color: s.color.to_array(),
                line_height,
                text_align: match s.text_align {
                    style::TextAlign::Left => "left".to_string(),
                    style::TextAlign::Center => "center".to_string(),
                    style::TextAlign::Right => "right".to_string(),
                },
                underline: s.text_decoration == style::TextDecoration::Underline,
            });
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::None => {}
    }

    lb.children = pbox
        .children
        .iter()
        .map(|child| build_layout_box(child, fonts))
        .collect();
    lb
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Lay out one label card of `card_width` px. The card's height follows its
/// content; the returned root box carries the final card size.
pub fn layout_card(
    styled_nodes: &[StyledNode],
    card_width: f32,
    fonts: &FontManager,
) -> Result<LayoutBox> {
    if !(card_width.is_finite() && card_width > 0.0) {
        return Err(LabelError::Template(format!(
            "card width must be positive, got {card_width}"
        )));
    }
    let mut builder = LayoutBuilder::new(fonts);

    let child_ids = styled_nodes
        .iter()
        .map(|node| builder.build_node(node, card_width))
        .collect::<Result<Vec<_>>>()?;

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: taffy::Dimension::Length(card_width),
            height: taffy::Dimension::Auto,
        },
        ..Default::default()
    };

    let root = builder
        .taffy
        .new_with_children(root_style, &child_ids)
        .map_err(taffy_err)?;

    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(card_width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(taffy_err)?;

    let root_box = builder.extract(root, 0.0, 0.0)?;
    Ok(build_layout_box(&root_box, fonts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::style::build_styled_tree;

    fn lay_out(html: &str, width: f32) -> LayoutBox {
        let dom = parse_html(html);
        let styled = build_styled_tree(&dom, None);
        layout_card(&styled, width, &FontManager::default()).unwrap()
    }

    #[test]
    fn layout_simple_paragraph() {
        let card = lay_out("<p>Hello world</p>", 384.0);
        assert_eq!(card.width, 384.0);
        assert!(card.height > 0.0, "Card should have height");
        assert_eq!(card.text_lines(), vec!["Hello world"]);
    }

    #[test]
    fn br_splits_lines() {
        let card = lay_out("<p>12 MG Road<br>Flat 4</p>", 384.0);
        assert_eq!(card.text_lines(), vec!["12 MG Road", "Flat 4"]);
    }

    #[test]
    fn flex_row_halves_sit_side_by_side() {
        let html = r#"<div class="flex"><div class="w-1/2">A</div><div class="w-1/2">B</div></div>"#;
        let card = lay_out(html, 400.0);
        let row = &card.children[0];
        assert_eq!(row.children.len(), 2);
        let (a, b) = (&row.children[0], &row.children[1]);
        assert!((a.width - 200.0).abs() < 0.5, "got {}", a.width);
        assert!((b.x - 200.0).abs() < 0.5, "got {}", b.x);
        assert_eq!(a.y, b.y);
    }

    #[test]
    fn right_aligned_text_hugs_right_edge() {
        let card = lay_out(r#"<div class="flex flex-col"><p class="text-right">x</p></div>"#, 200.0);
        let leaf = card
            .descendants()
            .into_iter()
            .find(|b| b.text.is_some())
            .unwrap();
        assert!((leaf.x + leaf.width - 200.0).abs() < 0.5);
    }

    #[test]
    fn undecodable_image_keeps_src_for_rasterizer() {
        let card = lay_out(r#"<img src="data:image/png;base64,AAAA" />"#, 100.0);
        assert_eq!(card.image_sources(), vec!["data:image/png;base64,AAAA"]);
    }

    #[test]
    fn rejects_zero_width() {
        let styled = build_styled_tree(&parse_html("<p>x</p>"), None);
        assert!(matches!(
            layout_card(&styled, 0.0, &FontManager::default()),
            Err(LabelError::Template(_))
        ));
    }
}
