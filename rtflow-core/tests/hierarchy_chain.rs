#![allow(clippy::cast_precision_loss)]
use rtflow_core::{Dataset, DatasetHandle, FeatureTable, PolygonFilter};

fn generate_dataset(n: usize) -> DatasetHandle {
    let area = (0..n).map(|i| (i % 100) as f64).collect();
    let deform = (0..n).map(|i| (i % 50) as f64 / 100.0).collect();
    let table = FeatureTable::new()
        .with_column("area_um", area)
        .unwrap()
        .with_column("deform", deform)
        .unwrap();
    DatasetHandle::new(Dataset::new("generated", table))
}

#[test]
fn test_three_stage_chain() {
    let root = generate_dataset(10_000);
    root.borrow_mut()
        .config
        .filtering
        .set_range("area_um", 10.0, 49.0);
    root.apply_filter().unwrap();
    assert_eq!(root.borrow().filter().count(), 4000);

    let child = root.new_child();
    assert_eq!(child.len(), 4000);
    let square = PolygonFilter::new(
        "Polygon_1",
        ("area_um", "deform"),
        vec![[0.0, 0.0], [0.0, 0.2], [30.0, 0.2], [30.0, 0.0]],
    )
    .unwrap();
    child.borrow_mut().polygon_filter_add(square);
    child.apply_filter().unwrap();
    assert_eq!(child.borrow().filter().count(), 1000);

    let grandchild = child.new_child();
    grandchild.borrow_mut().config.filtering.limit_events = 250;
    grandchild.apply_filter().unwrap();
    assert_eq!(grandchild.len(), 1000);
    assert_eq!(grandchild.borrow().filter().count(), 250);

    let ds = grandchild.borrow();
    let (lo, hi) = ds.min_max("area_um").unwrap().unwrap();
    assert!(lo >= 10.0 && hi <= 19.0, "unexpected range {lo}..{hi}");
}

#[test]
fn test_parent_change_propagates_to_grandchild() {
    let root = generate_dataset(1000);
    let child = root.new_child();
    let grandchild = child.new_child();
    assert_eq!(grandchild.len(), 1000);

    root.borrow_mut()
        .config
        .filtering
        .set_range("area_um", 0.0, 9.0);
    grandchild.apply_filter().unwrap();
    assert_eq!(child.len(), 100);
    assert_eq!(grandchild.len(), 100);
}
