use eframe::egui;

use warpfe::app::WarpApp;
use warpfe::{cli, logger};

fn main() -> Result<(), eframe::Error> {
    // -- CLI / headless mode ---------------------------------------------
    // Any --input/-i flag routes to batch processing before a window opens.
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        let code = cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS {
            0
        } else {
            1
        });
    }

    // -- GUI mode --------------------------------------------------------

    // Initialize session log (overwrites previous session log)
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_title("WarpFE")
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "WarpFE",
        options,
        Box::new(|cc| Box::new(WarpApp::new(cc))),
    )
}
