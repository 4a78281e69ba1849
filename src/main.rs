fn main() -> anyhow::Result<()> {
    cards_tui::cli::run()
}
