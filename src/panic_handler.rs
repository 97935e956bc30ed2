use std::io::{self, Write};
use std::panic;

/// Install the process panic hook.
///
/// Debug builds get `better-panic` backtraces; release builds write a
/// `human-panic` crash report. Either way stdout is flushed first so a
/// partially printed snapshot is not interleaved with the report.
pub fn initialize_panic_handler() {
    if cfg!(debug_assertions) {
        better_panic::install();
    } else {
        human_panic::setup_panic!();
    }

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        log::error!("Panic: {panic_info}");
        flush_output();
        default_hook(panic_info);
        std::process::exit(1);
    }));
}

fn flush_output() {
    let _ = io::stdout().flush();
    let _ = writeln!(io::stderr());
}
