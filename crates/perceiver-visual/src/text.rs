///! Matching target text against detected text blocks
use crate::models::TextBlock;
use soulheal_core_types::PixelRect;
use std::collections::BTreeMap;

/// Lowercase and collapse whitespace so OCR spacing noise does not matter.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Blocks matching `target`, best first.
///
/// Exact (normalised) matches rank before substring matches; inside each
/// group duplicates are ordered top-to-bottom, then left-to-right. Blocks
/// below `min_confidence` are ignored.
pub fn match_text<'a>(
    blocks: &'a [TextBlock],
    target: &str,
    min_confidence: f32,
) -> Vec<&'a TextBlock> {
    let needle = normalize_text(target);
    if needle.is_empty() {
        return Vec::new();
    }

    let mut exact = Vec::new();
    let mut partial = Vec::new();
    for block in blocks.iter().filter(|b| b.confidence >= min_confidence) {
        let haystack = normalize_text(&block.text);
        if haystack == needle {
            exact.push(block);
        } else if haystack.contains(&needle) {
            partial.push(block);
        }
    }
    exact.sort_by(|a, b| a.bounds.reading_order(&b.bounds));
    partial.sort_by(|a, b| a.bounds.reading_order(&b.bounds));

    let mut ranked: Vec<&TextBlock> = Vec::with_capacity(exact.len() + partial.len());
    for block in exact.into_iter().chain(partial) {
        if !ranked.iter().any(|seen| seen.bounds == block.bounds) {
            ranked.push(block);
        }
    }
    ranked
}

/// Parse Tesseract TSV output into word blocks plus multi-word line blocks.
///
/// Confidence is rescaled from 0-100 to 0.0-1.0. Rows that are not words
/// (level != 5) or carry no text are skipped.
pub fn parse_tsv(tsv: &str) -> Vec<TextBlock> {
    let mut words = Vec::new();
    let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<TextBlock>> = BTreeMap::new();

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11..].join("\t");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let nums: Option<Vec<u32>> = cols[1..10]
            .iter()
            .map(|value| value.trim().parse::<u32>().ok())
            .collect();
        let Some(nums) = nums else {
            continue;
        };
        let confidence = cols[10].trim().parse::<f32>().unwrap_or(-1.0);
        if confidence < 0.0 {
            continue;
        }
        let block = TextBlock {
            text: text.to_string(),
            confidence: (confidence / 100.0).min(1.0),
            bounds: PixelRect::new(nums[5], nums[6], nums[7], nums[8]),
        };
        lines
            .entry((nums[0], nums[1], nums[2], nums[3]))
            .or_default()
            .push(block.clone());
        words.push(block);
    }

    for line in lines.into_values().filter(|line| line.len() > 1) {
        words.push(merge_line(&line));
    }
    words
}

fn merge_line(words: &[TextBlock]) -> TextBlock {
    let left = words.iter().map(|w| w.bounds.x).min().unwrap_or(0);
    let top = words.iter().map(|w| w.bounds.y).min().unwrap_or(0);
    let right = words.iter().map(|w| w.bounds.right()).max().unwrap_or(left);
    let bottom = words.iter().map(|w| w.bounds.bottom()).max().unwrap_or(top);
    let confidence = words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
    TextBlock {
        text: words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        confidence,
        bounds: PixelRect::new(left, top, right - left, bottom - top),
    }
}
