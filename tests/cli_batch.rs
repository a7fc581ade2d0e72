use clap::Parser;
use pixelfe::canvas::{CanvasState, PixRect};
use pixelfe::cli::{self, CliArgs};
use pixelfe::io::{load_image_sync, load_project, save_document};
use pixelfe::project::Project;
use pixelfe::settings::SelectionSettings;

const RED: [u8; 4] = [0, 0, 255, 255];

fn write_sprite(dir: &std::path::Path) -> std::path::PathBuf {
    let mut canvas = CanvasState::new(8, 8);
    canvas.layers[0].pixels.put_pixel(1, 1, RED);
    let path = dir.join("sprite.png");
    save_document(&canvas, &path).unwrap();
    path
}

#[test]
fn scales_selection_into_png() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_sprite(dir.path());
    let output = dir.path().join("big.png");
    let settings = dir.path().join("none.cfg");

    let args = CliArgs::parse_from([
        "pixelfe",
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--settings",
        settings.to_str().unwrap(),
        "--select",
        "0,0,4,4",
        "--scale",
        "2",
    ]);
    cli::run(args);

    // 4x4 at (0,0) doubled about its center (2,2) lands at (-2,-2).
    let out = load_image_sync(&output).unwrap();
    let px = &out.layers[0].pixels;
    assert_eq!(px.get_pixel(0, 0), RED);
    assert_eq!(px.get_pixel(1, 1), RED);
    assert_eq!(px.get_pixel(2, 2), [0, 0, 0, 0]);
}

#[test]
fn project_output_keeps_selection() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_sprite(dir.path());
    let output = dir.path().join("moved.pxs");
    let settings = dir.path().join("none.cfg");

    cli::run(CliArgs::parse_from([
        "pixelfe",
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--settings",
        settings.to_str().unwrap(),
        "--select",
        "1,1,1,1",
        "--move",
        "4,5",
    ]));

    let doc = load_project(&output).unwrap();
    assert_eq!(doc.selection.bounds(), PixRect::new(5, 6, 1, 1));
    assert_eq!(doc.layers[0].pixels.get_pixel(5, 6), RED);
    assert_eq!(doc.layers[0].pixels.get_pixel(1, 1), [0, 0, 0, 0]);
}

#[test]
fn project_undo_redo_through_container() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_sprite(dir.path());
    let canvas = load_image_sync(&input).unwrap();
    let mut project = Project::from_file(input, canvas, SelectionSettings::default());
    assert_eq!(project.name, "sprite.png");

    let Project { canvas_state, history, selection, .. } = &mut project;
    selection.select_rect(canvas_state, history, PixRect::new(0, 0, 2, 2), pixelfe::selection::SelectionMode::Replace);
    selection.nudge(canvas_state, history, 3, 0);
    selection.commit(canvas_state, history);
    assert_eq!(canvas_state.layers[0].pixels.get_pixel(4, 1), RED);

    assert_eq!(project.undo().as_deref(), Some("Commit Selection"));
    assert_eq!(project.undo().as_deref(), Some("Move Selection"));
    assert_eq!(project.undo().as_deref(), Some("Lift Selection"));
    assert_eq!(project.canvas_state.layers[0].pixels.get_pixel(1, 1), RED);
    assert!(project.is_dirty);
    assert_eq!(project.redo().as_deref(), Some("Lift Selection"));
}
