use colored::Colorize;

fn main() {
    if let Err(e) = raas::run() {
        eprintln!("{} {}", "error:".bright_red(), e);
        std::process::exit(1);
    }
}
