use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use lensgrid::error::RectifyResult;
use lensgrid::geometry::Xy;
use lensgrid::optics::OpticsRecipe;
use lensgrid::{DetectionReport, RectificationRecord};

fn new_table(header: &str) -> Table {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec![
        Cell::new(header).add_attribute(Attribute::Bold),
        Cell::new("x").fg(Color::Cyan),
        Cell::new("y").fg(Color::Cyan),
    ]);
    for i in 1..=2 {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }
    table
}

fn vector_row(name: &str, v: Xy) -> Vec<Cell> {
    vec![
        Cell::new(name),
        Cell::new(format!("{:.3}", v.x)),
        Cell::new(format!("{:.3}", v.y)),
    ]
}

pub fn print_detection(report: &DetectionReport) {
    let steps = &report.steps;
    let params = &report.params;

    println!("\nLens Grid ({} strategy)", report.strategy);
    let mut table = new_table("Component");
    table.add_row(vector_row("Reference lens", steps.reference_point));
    table.add_row(vector_row("Right step", steps.horizontal));
    table.add_row(vector_row("Down step", steps.vertical));
    table.add_row(vector_row("Pitch", params.size()));
    table.add_row(vector_row("Offset", params.offset()));
    println!("{}", table);

    let mut stats = Table::new();
    stats.load_preset(ASCII_FULL);
    stats.add_row(vec![
        Cell::new("Rotation"),
        Cell::new(format!("{:.4} deg", params.tau().to_degrees())),
    ]);
    stats.add_row(vec![
        Cell::new("Fitness").fg(Color::Green),
        Cell::new(format!("{:.4}", report.fitness)),
    ]);
    stats.add_row(vec![Cell::new("Candidates"), Cell::new(report.candidates)]);
    stats.add_row(vec![Cell::new("Restarts"), Cell::new(report.restarts)]);
    println!("{}", stats);
}

/// The six-number line consumed by downstream rectification tools.
pub fn print_record_line(r: &RectificationRecord) {
    println!(
        "({:.6},{:.6},{:.6},{:.6},{:.6},{:.6})",
        r.x_offset, r.y_offset, r.right_dx, r.right_dy, r.down_dx, r.down_dy
    );
}

pub fn print_mean(frames: usize, record: &RectificationRecord) {
    println!("\nMean of {} frames", frames);
    print_record_line(record);
}

pub fn print_optics(recipe: &OpticsRecipe, slope: &RectifyResult<f64>) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec![
        Cell::new("Parameter").add_attribute(Attribute::Bold),
        Cell::new("Value"),
    ]);
    if let Some(col) = table.column_mut(1) {
        col.set_cell_alignment(CellAlignment::Right);
    }

    table.add_row(vec![Cell::new("Pitch (um)"), Cell::new(recipe.pitch)]);
    table.add_row(vec![Cell::new("Focal length (um)"), Cell::new(recipe.flen)]);
    table.add_row(vec![Cell::new("Magnification"), Cell::new(recipe.mag)]);
    table.add_row(vec![Cell::new("Objective NA"), Cell::new(recipe.na)]);
    table.add_row(vec![Cell::new("Medium index"), Cell::new(recipe.medium)]);
    table.add_row(vec![Cell::new("Abbe sine condition"), Cell::new(recipe.abbe)]);
    table.add_row(vec![
        Cell::new("Image-side NA"),
        Cell::new(format!("{:.6}", recipe.image_na())),
    ]);
    let slope_cell = match slope {
        Ok(s) => Cell::new(format!("{:.6}", s)).fg(Color::Green),
        Err(_) => Cell::new("inconsistent").fg(Color::Red),
    };
    table.add_row(vec![
        Cell::new("Max normalized slope").add_attribute(Attribute::Bold),
        slope_cell,
    ]);
    println!("{}", table);
}
