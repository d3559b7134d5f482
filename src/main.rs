fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = modpack_sync::cli::run_cli(args);
    std::process::exit(code);
}
