use crate::state::AppState;

/// Print the effective configuration
pub fn config(state: &AppState) -> anyhow::Result<()> {
    let config = &state.config;
    println!("Enrichment configuration:");
    println!("  data_dir:           {}", config.data_dir.display());
    println!(
        "  source:             {}",
        config
            .source_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(unset)".to_string())
    );
    println!("  store:              {:?}", config.store);
    println!("  batch_size:         {}", config.batch_size);
    println!("  classify_timeout:   {}s", config.classify_timeout.as_secs());
    println!("  vocabulary:         {:?}", config.vocabulary);
    println!("  seed_lookback_days: {}", config.seed_lookback_days);
    println!("  min_text_chars:     {}", config.min_text_chars);
    Ok(())
}
