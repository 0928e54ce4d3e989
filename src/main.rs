fn main() -> anyhow::Result<()> {
    site_analytics_lib::run()
}
