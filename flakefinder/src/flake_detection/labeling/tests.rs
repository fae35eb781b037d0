use super::*;

/// Mask from ASCII art: `#` is foreground.
fn mask_from(rows: &[&str]) -> Buffer2<bool> {
    let width = rows[0].len();
    let pixels = rows
        .iter()
        .flat_map(|r| r.chars().map(|c| c == '#'))
        .collect();
    Buffer2::new(width, rows.len(), pixels)
}

#[test]
fn empty_mask_has_no_labels() {
    let mask = mask_from(&["....", "....", "...."]);
    let labels = LabelMap::from_mask(&mask, Connectivity::Eight);
    assert_eq!(labels.num_labels(), 0);
    assert!(labels.labels().iter().all(|&l| l == 0));
}

#[test]
fn diagonal_touch_depends_on_connectivity() {
    let mask = mask_from(&["#...", ".#..", "..#.", "...."]);
    assert_eq!(LabelMap::from_mask(&mask, Connectivity::Four).num_labels(), 3);
    assert_eq!(LabelMap::from_mask(&mask, Connectivity::Eight).num_labels(), 1);
}

#[test]
fn u_shape_merges_into_one_component() {
    // Two arms meet only at the bottom row, forcing a union.
    let mask = mask_from(&["#...#", "#...#", "#####"]);
    let labels = LabelMap::from_mask(&mask, Connectivity::Four);
    assert_eq!(labels.num_labels(), 1);

    let components = labels.components();
    assert_eq!(components[0].len(), 9);
}

#[test]
fn labels_follow_raster_discovery_order() {
    let mask = mask_from(&[
        "......##", //
        "##......",
        "........",
        "...#....",
    ]);
    let labels = LabelMap::from_mask(&mask, Connectivity::Eight);
    assert_eq!(labels.num_labels(), 3);
    assert_eq!(labels[6], 1);
    assert_eq!(labels[8], 2);
    assert_eq!(labels[3 * 8 + 3], 3);
}

#[test]
fn merged_component_keeps_first_label() {
    // Right arm starts first in raster order but joins the left arm later.
    let mask = mask_from(&[
        "....#", //
        "#...#",
        "#####",
        ".....",
        "..#..",
    ]);
    let labels = LabelMap::from_mask(&mask, Connectivity::Four);
    assert_eq!(labels.num_labels(), 2);
    assert_eq!(labels[4], 1);
    assert_eq!(labels[5], 1);
    assert_eq!(labels[4 * 5 + 2], 2);
}

#[test]
fn components_are_in_raster_order() {
    let mask = mask_from(&["##.", ".##", "..."]);
    let components = LabelMap::from_mask(&mask, Connectivity::Four).components();
    assert_eq!(components, vec![vec![0, 1, 4, 5]]);
}

#[test]
fn runs_cover_row_edges() {
    let mut runs = Vec::new();
    extract_runs(&[true, true, false, true], &mut runs);
    assert_eq!(runs.len(), 2);
    assert_eq!((runs[0].start, runs[0].end), (0, 2));
    assert_eq!((runs[1].start, runs[1].end), (3, 4));
}
