mod config;
mod error;
mod event;
mod launch;
mod options;
mod pty;
mod server;
mod window;

use std::process::ExitCode;

use config::Config;
use error::LaunchError;
use launch::LaunchRequest;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let request = match options::parse(&args) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("tern: {}", e);
            eprintln!("Try 'tern --help' for more information.");
            return ExitCode::from(LaunchError::Options(e).exit_code());
        }
    };

    if request.show_help {
        print_help();
        return ExitCode::SUCCESS;
    }
    if request.show_version {
        println!("tern {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    if request.show_colors {
        print_colors();
        return ExitCode::SUCCESS;
    }

    let config = Config::load();
    let display = match resolve_display(&request) {
        Ok(display) => display,
        Err(e) => {
            eprintln!("tern: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("tern: {}", e);
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async {
        let handle = if request.disable_server {
            None
        } else {
            server::locate::locate(&display).await
        };
        server::dispatch::dispatch(request, handle, &display, config).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tern: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// The display every coordination decision is scoped to: an explicit
/// `--display` on the first window wins, then `$DISPLAY`. No display at all
/// is an environment failure — nothing is located or published.
fn resolve_display(request: &LaunchRequest) -> Result<String, LaunchError> {
    request
        .windows
        .first()
        .and_then(|w| w.display.clone())
        .or_else(|| std::env::var("DISPLAY").ok())
        .ok_or_else(|| {
            LaunchError::Linker(
                "cannot determine display: $DISPLAY is unset and no --display given".into(),
            )
        })
}

fn print_help() {
    println!(
        "\
tern — a single-instance tabbed terminal

Usage: tern [OPTIONS] [-- COMMAND...]

Boundaries:
      --window                 start a new window
      --tab                    start a new tab in the current window
  -e, --execute, --           run the rest of the line in the current tab

Per tab:
  -d, --working-directory DIR  working directory
  -T, --title TITLE            tab title
  -H, --hold                   keep the tab open after the command exits
      --command STRING         command for this tab (quoted, word-split)

Per window:
      --geometry COLSxROWS[+X+Y]
      --display DISPLAY        open on this display
      --role ROLE              window role hint
      --icon NAME              window icon
      --startup-id ID          startup notification id
      --sm-client-id ID        session management id
  -F, --fullscreen             open fullscreen
  -M, --maximize               open maximized
      --show-menubar / --hide-menubar
      --show-toolbar / --hide-toolbar
      --show-borders / --hide-borders
      --drop-down              drop-down window
      --reuse-last-window      add tabs to the last reusable window

Global:
      --disable-server         do not talk to or become the shared server
      --show-colors            print the terminal palette and exit
  -h, --help                   show this help and exit
  -V, --version                show the version and exit"
    );
}

fn print_colors() {
    for row in [30, 90] {
        for col in 0..8 {
            print!("\x1b[{}m ███ \x1b[0m", row + col);
        }
        println!();
    }
}
