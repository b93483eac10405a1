//! End-to-end layer scenarios driving the core through the conv driver
//! against in-memory DRAM images.

use spinesim_core::constants::NUM_PE;
use spinesim_core::{Core, CoreParams};
use spinesim_model::{
    parse_config_str, run_network, ConvLayer, LayerKind, LayerSpec, RunOptions, WeightQuant,
};
use spinesim_storage::{Entry, LayerMeta, SpineDram, SpineMeta, WeightTileMeta};

/// Pack input spines and weight tiles into a DRAM image with an output
/// region behind them.
fn build_dram(
    layer: u32,
    spines: &[(u32, Vec<Entry>)],
    tiles: &[(u32, Vec<u8>)],
    out_capacity: u64,
) -> SpineDram {
    let mut image = Vec::new();
    let mut meta = LayerMeta::default();

    for (id, entries) in spines {
        let bytes = Entry::encode_stream(entries);
        meta.input_spines.insert(
            *id,
            SpineMeta { id: *id, addr: image.len() as u64, size: bytes.len() as u32 },
        );
        image.extend_from_slice(&bytes);
    }
    for (tile, bytes) in tiles {
        meta.weight_tiles.insert(
            *tile,
            WeightTileMeta { tile: *tile, addr: image.len() as u64, size: bytes.len() as u32 },
        );
        image.extend_from_slice(bytes);
    }

    meta.output_region_begin = image.len() as u64;
    meta.output_region_end = meta.output_region_begin + out_capacity;
    meta.output_write_ptr = meta.output_region_begin;

    let mut dram = SpineDram::new(meta.output_region_end);
    dram.load_raw_image(&image).unwrap();
    dram.set_layer_meta(layer, meta).unwrap();
    dram
}

fn conv_spec(c_in: usize, c_out: usize, hw_in: (usize, usize), k: (usize, usize)) -> LayerSpec {
    LayerSpec {
        layer_id: 0,
        name: "scenario".into(),
        kind: LayerKind::Conv,
        c_in,
        h_in: hw_in.0,
        w_in: hw_in.1,
        c_out,
        k_h: k.0,
        k_w: k.1,
        s_h: 1,
        s_w: 1,
        p_h: 0,
        p_w: 0,
        declared_out: None,
        threshold: 1,
        weight_quant: WeightQuant::default(),
    }
}

fn constant_tile(rows_per_tile: usize, weight: u8) -> Vec<u8> {
    vec![weight; rows_per_tile * NUM_PE]
}

// S1 — single entry, single tile: every PE fires once at ts 5
#[test]
fn single_entry_single_tile() {
    let spec = conv_spec(1, 128, (1, 1), (1, 1));
    let mut dram = build_dram(
        0,
        &[(0, vec![Entry::new(5, 0)])],
        &[(0, constant_tile(1, 2))],
        4096,
    );

    let mut layer = ConvLayer::new(&spec).unwrap();
    let report = layer.run_layer(&mut dram, &RunOptions::default()).unwrap();
    assert_eq!(report.drained_entries, 128);

    let out = dram.output_entries(0, 0).unwrap();
    assert_eq!(out.len(), 128);
    for (i, e) in out.iter().enumerate() {
        assert_eq!(e.ts, 5);
        assert_eq!(e.neuron_id, i as u32);
    }
}

// S2 — zero weights: no PE reaches the threshold
#[test]
fn pe_non_firing() {
    let spec = conv_spec(1, 128, (1, 1), (1, 1));
    let mut dram = build_dram(
        0,
        &[(0, vec![Entry::new(5, 0)])],
        &[(0, constant_tile(1, 0))],
        4096,
    );

    let mut layer = ConvLayer::new(&spec).unwrap();
    let report = layer.run_layer(&mut dram, &RunOptions::default()).unwrap();
    assert_eq!(report.drained_entries, 0);
    assert!(dram.output_entries(0, 0).unwrap().is_empty());
}

// S3 — two lanes merge into one ascending timestamp sequence
#[test]
fn two_lane_merge() {
    // one site whose 1x2 kernel covers both input positions
    let spec = conv_spec(2, 128, (1, 2), (1, 2));
    let rows_per_tile = 2 * 1 * 2;
    let mut dram = build_dram(
        0,
        &[
            (0, vec![Entry::new(1, 0), Entry::new(4, 0)]),
            (1, vec![Entry::new(2, 1), Entry::new(3, 1)]),
        ],
        &[(0, constant_tile(rows_per_tile, 2))],
        16 * 1024,
    );

    let mut layer = ConvLayer::new(&spec).unwrap();
    let report = layer.run_layer(&mut dram, &RunOptions::default()).unwrap();
    assert_eq!(report.drained_entries, 4 * 128);

    let out = dram.output_entries(0, 0).unwrap();
    assert_eq!(out.len(), 4 * 128);
    for (group, ts) in [1u8, 2, 3, 4].iter().enumerate() {
        let chunk = &out[group * 128..(group + 1) * 128];
        for (i, e) in chunk.iter().enumerate() {
            assert_eq!(e.ts, *ts);
            assert_eq!(e.neuron_id, i as u32);
        }
    }
}

// S4 — a tap outside the kernel window is dropped at row lookup
#[test]
fn padding_tap_dropped() {
    let params = CoreParams {
        layer_id: 0,
        c_in: 1,
        c_out: 128,
        h_in: 8,
        w_in: 8,
        h_out: 6,
        w_out: 6,
        k_h: 3,
        k_w: 3,
        s_h: 1,
        s_w: 1,
        p_h: 0,
        p_w: 0,
        threshold: 1,
        total_tiles: 1,
    };
    let spine_55 = 5 * 8 + 5;
    let mut dram = build_dram(
        0,
        &[(spine_55, vec![Entry::new(3, spine_55)])],
        &[(0, constant_tile(9, 2))],
        4096,
    );

    let mut core = Core::new(params).unwrap();
    // hand the (5,5) spine to site (0,0), where its taps decode to r=c=5
    core.prepare_site(0, 0, vec![vec![spine_55]]).unwrap();
    core.prepare_tile(&dram, 0).unwrap();
    let mut guard = 0;
    while !core.compute_finished() {
        core.step_once(&dram, 0).unwrap();
        guard += 1;
        assert!(guard < 10_000);
    }
    let drained = core.drain_and_store(&mut dram).unwrap();
    assert_eq!(drained, 0);
    assert!(dram.output_entries(0, 0).unwrap().is_empty());
}

// S5 — a merged stream longer than one FIFO stalls stage 4 without loss
#[test]
fn fifo_backpressure() {
    let spec = conv_spec(1, 128, (1, 1), (1, 1));
    let entries: Vec<Entry> = (0..256).map(|i| Entry::new(i as u8, 0)).collect();
    let mut dram = build_dram(
        0,
        &[(0, entries)],
        &[(0, constant_tile(1, 2))],
        256 * 128 * Entry::WIRE_BYTES as u64 + 1024,
    );

    let mut layer = ConvLayer::new(&spec).unwrap();
    let report = layer.run_layer(&mut dram, &RunOptions::default()).unwrap();

    // no entry lost: every input fired all 128 PEs
    assert_eq!(report.drained_entries, 256 * 128);
    // the full FIFO must have stalled the min finder at least once
    assert!(report.stats.mfb.eligible_but_noop > 0);

    let out = dram.output_entries(0, 0).unwrap();
    assert_eq!(out.len(), 256 * 128);
    for pair in out.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

// S6 — output neuron ids across tiles and sites
#[test]
fn multi_tile_output_neuron_ids() {
    // 4x4 input, 1x1 kernel: 16 sites, C_out=256 -> 2 tiles
    let spec = conv_spec(1, 256, (4, 4), (1, 1));
    let spines: Vec<(u32, Vec<Entry>)> = (0..16)
        .map(|p| (p, vec![Entry::new((p % 200) as u8, p)]))
        .collect();
    let mut dram = build_dram(
        0,
        &spines,
        &[(0, constant_tile(1, 2)), (1, constant_tile(1, 2))],
        1024 * 1024,
    );

    let mut layer = ConvLayer::new(&spec).unwrap();
    assert_eq!(layer.total_tiles(), 2);
    let report = layer.run_layer(&mut dram, &RunOptions::default()).unwrap();
    assert_eq!(report.drained_entries, 16 * 256);

    for h in 0..4u32 {
        for w in 0..4u32 {
            let spine = h * 4 + w;
            let out = dram.output_entries(0, spine).unwrap();
            assert_eq!(out.len(), 256, "site ({h}, {w})");
            let base = spine * 256;
            for (i, e) in out.iter().enumerate() {
                // PE i of tile t emits (h*W_out + w) * C_out + t*128 + i
                assert_eq!(e.neuron_id, base + i as u32, "site ({h}, {w})");
            }
        }
    }
}

// whole-network smoke: config parse -> run_network -> summary rows
#[test]
fn network_run_with_config() {
    let json = r#"{
        "layers": [
            {
                "L": 0, "name": "conv1", "kind": "conv",
                "params_in": {"C": 1, "H": 1, "W": 1},
                "params_weight": {
                    "Cin": 1, "Cout": 128, "Kh": 1, "Kw": 1,
                    "stride": {"h": 1, "w": 1},
                    "padding": {"h": 0, "w": 0},
                    "dilation": {"h": 1, "w": 1}
                },
                "params_out": {"C": 128, "H": 1, "W": 1}
            }
        ]
    }"#;
    let specs = parse_config_str(json).unwrap();

    let mut dram = build_dram(
        0,
        &[(0, vec![Entry::new(1, 0)])],
        &[(0, constant_tile(1, 2))],
        4096,
    );

    let reports = run_network(&specs, &mut dram, &RunOptions::default()).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].drained_entries, 128);
    assert!(reports[0].stats.step_cycles_total > 0);
    assert!(reports[0].stats.preload_input_cycles > 0);
    assert!(reports[0].stats.weight_load_cycles > 0);
    assert!(reports[0].stats.output_store_cycles > 0);

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("cycles_layer_summary.csv");
    spinesim_model::append_layer_summary(&csv_path, &reports[0]).unwrap();
    let text = std::fs::read_to_string(&csv_path).unwrap();
    assert!(text.starts_with("layer_id,step_cycles_total"));
    assert!(text.lines().nth(1).unwrap().starts_with("0,"));
}

// the cache sweep produces per-layer statistics
#[test]
fn cache_sweep_reports_stats() {
    let spec = conv_spec(1, 128, (1, 1), (1, 1));
    let entries: Vec<Entry> = (0..8).map(|i| Entry::new(i, 0)).collect();
    let mut dram = build_dram(
        0,
        &[(0, entries)],
        &[(0, constant_tile(1, 2))],
        64 * 1024,
    );

    let mut layer = ConvLayer::new(&spec).unwrap();
    let opts = RunOptions {
        cache: Some(Default::default()),
        ..Default::default()
    };
    let report = layer.run_layer(&mut dram, &opts).unwrap();

    let cache = report.cache.as_ref().unwrap();
    assert_eq!(cache.demand_accesses, 8);
    assert_eq!(cache.unique_demand_lines, 1);
    assert!(cache.miss_rate() < 1.0);
}
