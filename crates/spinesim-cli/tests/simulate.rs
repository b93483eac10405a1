use assert_cmd::Command;
use predicates::prelude::*;
use std::error::Error;
use std::path::Path;

use spinesim_storage::Entry;

/// Write a one-layer DRAM image and its combined config/metadata JSON.
///
/// The layer is a 1x1x1 conv with 128 output channels, one input spine with
/// two entries, and one constant weight tile.
fn write_fixture(dir: &Path) -> Result<(std::path::PathBuf, std::path::PathBuf), Box<dyn Error>> {
    let spine = Entry::encode_stream(&[Entry::new(1, 0), Entry::new(3, 0)]);
    let tile = vec![2u8; 128];

    let mut image = Vec::new();
    let spine_addr = image.len();
    image.extend_from_slice(&spine);
    let tile_addr = image.len();
    image.extend_from_slice(&tile);
    let out_begin = image.len();
    let out_end = out_begin + 4096;
    image.resize(out_end, 0);

    let json = format!(
        r#"{{
            "layers": [
                {{
                    "L": 0, "name": "conv1", "kind": "conv",
                    "params_in": {{"C": 1, "H": 1, "W": 1}},
                    "params_weight": {{
                        "Cin": 1, "Cout": 128, "Kh": 1, "Kw": 1,
                        "stride": {{"h": 1, "w": 1}},
                        "padding": {{"h": 0, "w": 0}},
                        "dilation": {{"h": 1, "w": 1}}
                    }},
                    "params_out": {{"C": 128, "H": 1, "W": 1}},
                    "input_spines": {{ "0": {{"addr": {spine_addr}, "size": {spine_size}}} }},
                    "weight_tiles": {{ "0": {{"addr": {tile_addr}, "size": 128}} }},
                    "output_region_begin": {out_begin},
                    "output_region_end": {out_end},
                    "output_write_ptr": {out_begin}
                }}
            ]
        }}"#,
        spine_addr = spine_addr,
        spine_size = spine.len(),
        tile_addr = tile_addr,
        out_begin = out_begin,
        out_end = out_end,
    );

    let bin_path = dir.join("dram_image.bin");
    let json_path = dir.join("config.json");
    std::fs::write(&bin_path, &image)?;
    std::fs::write(&json_path, json)?;
    Ok((bin_path, json_path))
}

#[test]
fn usage_error_exits_with_1() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("spinesim")?;
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
    Ok(())
}

#[test]
fn missing_image_exits_with_2() -> Result<(), Box<dyn Error>> {
    let tmp = tempfile::tempdir()?;
    let (_, json_path) = write_fixture(tmp.path())?;

    let mut cmd = Command::cargo_bin("spinesim")?;
    cmd.arg(tmp.path().join("nonexistent.bin"))
        .arg(&json_path)
        .current_dir(tmp.path());
    cmd.assert().failure().code(2);
    Ok(())
}

#[test]
fn simulates_one_layer_and_writes_summary() -> Result<(), Box<dyn Error>> {
    let tmp = tempfile::tempdir()?;
    let (bin_path, json_path) = write_fixture(tmp.path())?;
    let csv_path = tmp.path().join("cycles_layer_summary.csv");

    let mut cmd = Command::cargo_bin("spinesim")?;
    cmd.arg(&bin_path)
        .arg(&json_path)
        .arg("--summary-csv")
        .arg(&csv_path)
        .current_dir(tmp.path());
    cmd.assert().success();

    let text = std::fs::read_to_string(&csv_path)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "layer_id,step_cycles_total,preload_input_cycles,weight_load_cycle,output_drain_cycles,output_store_cycles"
    );
    assert!(lines[1].starts_with("0,"));
    Ok(())
}

#[test]
fn cache_sweep_writes_cache_summary() -> Result<(), Box<dyn Error>> {
    let tmp = tempfile::tempdir()?;
    let (bin_path, json_path) = write_fixture(tmp.path())?;
    let cache_csv = tmp.path().join("cache_summary.csv");

    let mut cmd = Command::cargo_bin("spinesim")?;
    cmd.arg(&bin_path)
        .arg(&json_path)
        .arg("--cache-sweep")
        .arg("--cache-policy")
        .arg("lru")
        .arg("--cache-summary-csv")
        .arg(&cache_csv)
        .current_dir(tmp.path());
    cmd.assert().success();

    let text = std::fs::read_to_string(&cache_csv)?;
    assert!(text.starts_with("layer_id,demand_accesses"));
    Ok(())
}
