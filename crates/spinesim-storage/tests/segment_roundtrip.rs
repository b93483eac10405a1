//! Round-trip property: anything written through StreamWriter is read back
//! by StreamReader in the same order, for both line layouts.

use proptest::prelude::*;

use spinesim_storage::{
    DramFormat, Entry, LayerDirectory, Region, StreamReader, StreamWriter,
};

fn entry_strategy() -> impl Strategy<Value = Entry> {
    (any::<u8>(), any::<u32>()).prop_map(|(ts, nid)| Entry::new(ts, nid))
}

fn roundtrip(fmt: DramFormat, spines: &[(u16, Vec<Entry>)]) {
    let mut image = Vec::new();
    {
        let mut writer = StreamWriter::new(fmt, &mut image);
        for (spine_id, entries) in spines {
            writer.append_spine(7, *spine_id, entries).unwrap();
        }
    }

    let mut dir = LayerDirectory::new();
    dir.set_input_range(7, Region::new(0, image.len() as u64));

    for (spine_id, entries) in spines {
        let mut reader = StreamReader::open_spine(fmt, &image, &dir, 7, *spine_id).unwrap();
        let mut collected = Vec::new();
        while let Some((_, chunk)) = reader.read_next().unwrap() {
            collected.extend(chunk);
        }
        assert_eq!(&collected, entries, "spine {spine_id} mismatch");
    }
}

proptest! {
    #[test]
    fn roundtrip_packed(entries in prop::collection::vec(entry_strategy(), 0..400)) {
        roundtrip(DramFormat::Packed { max_entries: 128 }, &[(0, entries)]);
    }

    #[test]
    fn roundtrip_fixed_stride(entries in prop::collection::vec(entry_strategy(), 0..400)) {
        roundtrip(DramFormat::FixedStride { max_entries: 128 }, &[(0, entries)]);
    }
}

#[test]
fn roundtrip_distinct_spines() {
    let a: Vec<Entry> = (0..130).map(|i| Entry::new((i % 250) as u8, i)).collect();
    let b: Vec<Entry> = (0..17).map(|i| Entry::new(i as u8, 1000 + i)).collect();
    roundtrip(DramFormat::Packed { max_entries: 128 }, &[(1, a), (2, b)]);
}
