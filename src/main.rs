fn main() {
    #[cfg(feature = "cli")]
    comboreq::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("comboreq: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
