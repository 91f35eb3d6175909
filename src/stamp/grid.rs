//! Calibration grid for tuning layout coordinates against a template.

use lopdf::content::Operation;
use lopdf::Object;

/// Spacing of the grid lines in points.
pub const GRID_STEP: f32 = 50.0;

/// Content-stream operations drawing a light grid every [`GRID_STEP`]
/// points, each line labelled with its coordinate in the font named
/// `font_resource`.
pub fn grid_operations(width: f32, height: f32, font_resource: &str) -> Vec<Operation> {
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("G", vec![0.75.into()]),
        Operation::new("w", vec![0.3.into()]),
    ];

    let xs = steps(width);
    let ys = steps(height);
    for &x in &xs {
        ops.push(Operation::new("m", vec![x.into(), 0.into()]));
        ops.push(Operation::new("l", vec![x.into(), height.into()]));
    }
    for &y in &ys {
        ops.push(Operation::new("m", vec![0.into(), y.into()]));
        ops.push(Operation::new("l", vec![width.into(), y.into()]));
    }
    ops.push(Operation::new("S", vec![]));

    ops.push(Operation::new("g", vec![0.45.into()]));
    for &x in xs.iter().filter(|&&x| x > 0.0) {
        ops.extend(label(font_resource, x + 1.0, 2.0, x));
    }
    for &y in ys.iter().filter(|&&y| y > 0.0) {
        ops.extend(label(font_resource, 2.0, y + 1.0, y));
    }
    ops.push(Operation::new("Q", vec![]));
    ops
}

fn steps(limit: f32) -> Vec<f32> {
    let count = (limit / GRID_STEP).floor().max(0.0) as u32;
    (0..=count).map(|i| i as f32 * GRID_STEP).collect()
}

fn label(font_resource: &str, x: f32, y: f32, value: f32) -> [Operation; 5] {
    [
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font_resource.into(), 5.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(format!("{}", value as i32))]),
        Operation::new("ET", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_grid_has_a_line_every_fifty_points() {
        let ops = grid_operations(595.28, 841.89, "FmGrid");
        let moves = ops.iter().filter(|o| o.operator == "m").count();
        // 0..=550 vertical (12) and 0..=800 horizontal (17).
        assert_eq!(moves, 12 + 17);
        let labels: Vec<_> = ops
            .iter()
            .filter(|o| o.operator == "Tj")
            .map(|o| o.operands[0].clone())
            .collect();
        assert_eq!(labels.len(), 11 + 16);
        assert!(labels.contains(&Object::string_literal("800")));
        assert_eq!(ops.first().map(|o| o.operator.as_str()), Some("q"));
        assert_eq!(ops.last().map(|o| o.operator.as_str()), Some("Q"));
    }
}
