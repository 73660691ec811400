use budget_core::{GroupId, LineItem, LineItemId};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn build_items(n: u32) -> Vec<LineItem> {
    (0..n)
        .map(|i| LineItem {
            id: LineItemId(format!("li-{i}")),
            group_id: GroupId::from("g-1"),
            name: format!("Item {i}"),
            quantity: None,
            margin_decimal: None,
            index_in_group: i,
            selected_option_id: None,
            options: vec![],
        })
        .collect()
}

fn bench_reorder(c: &mut Criterion) {
    let items = build_items(500);
    let last = LineItemId::from("li-499");
    c.bench_function("reorder 500 siblings last to first", |b| {
        b.iter(|| {
            let _ = black_box(budget_order::reorder(&items, &last, 0));
        })
    });
    c.bench_function("index updates after reorder", |b| {
        let after = budget_order::reorder(&items, &last, 0).unwrap();
        b.iter(|| black_box(budget_order::index_updates(&items, &after)))
    });
}

criterion_group!(benches, bench_reorder);
criterion_main!(benches);
