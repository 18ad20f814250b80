// Build script: ESP-IDF cfg and link arguments for the firmware target.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

fn main() -> anyhow::Result<()> {
    // Host builds (library tests) have no ESP-IDF to propagate from.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::build::CfgArgs::output_propagated("ESP_IDF")?;
        embuild::build::LinkArgs::output_propagated("ESP_IDF")?;
    }
    Ok(())
}
