//! Check system capabilities.

use tarantino_capture_engine::pipeline::{element_report, PLATFORM_ELEMENTS};
use tarantino_common::config::config_file_path;
use tarantino_render_engine::mux::command_exists;

pub fn run() -> anyhow::Result<()> {
    println!("Tarantino System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = command_exists("ffmpeg");
    if ffmpeg {
        println!("[OK] ffmpeg found");
    } else {
        println!("[WARN] ffmpeg not found: recordings keep their raw artifacts unmuxed");
    }

    let mut elements_ok = true;
    match element_report() {
        Ok(report) => {
            println!();
            println!("GStreamer elements:");
            for (element, available) in report {
                let required = !PLATFORM_ELEMENTS.contains(&element);
                let tag = match (available, required) {
                    (true, _) => "[OK]  ",
                    (false, true) => "[FAIL]",
                    (false, false) => "[WARN]",
                };
                println!("  {tag} {element}");
                if !available && required {
                    elements_ok = false;
                }
            }
        }
        Err(e) => {
            println!("[FAIL] GStreamer unavailable: {e}");
            elements_ok = false;
        }
    }

    println!();
    println!("Config file: {}", config_file_path().display());
    println!();
    if elements_ok && ffmpeg {
        println!("All required capabilities are available. Tarantino is ready.");
    } else if elements_ok {
        println!("Recording works; install ffmpeg to produce final containers.");
    } else {
        println!("Some required capabilities are missing. Use --synthetic for a dry run.");
    }

    Ok(())
}
