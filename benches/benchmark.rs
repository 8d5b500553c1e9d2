use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use bookcase::construct::EntityKind;
use bookcase::criteria::{compile_filter, Criterion as Filter};
use bookcase::formatter::{parse, Evaluator, Value};
use bookcase::sort::{compile_sort, Direction, SortSpec};

const TEMPLATE: &str = "{authors#0|def('Unknown')}/{?series|wrap('@ ')}{?series_index|pad_left(2, '0')} - {title|trim}.{format|lowercase}";

fn metadata(name: &str, specifier: Option<&str>) -> Option<Value> {
    match (name, specifier) {
        ("authors", Some(_)) => Some("Stephen King".into()),
        ("series", _) => Some("The Dark Tower".into()),
        ("series_index", _) => Some(Value::from(3i64)),
        ("title", _) => Some("  The Waste Lands ".into()),
        ("format", _) => Some("EPUB".into()),
        _ => None,
    }
}

fn templates(c: &mut Criterion) {
    c.bench_function("parse template", |b| b.iter(|| parse(black_box(TEMPLATE))));
    let evaluator = Evaluator::new(metadata, false);
    c.bench_function("process template", |b| {
        b.iter(|| evaluator.process(black_box(TEMPLATE)))
    });
}

fn compilation(c: &mut Criterion) {
    let filter = Filter::equal("authors#nameSort", "King, Stephen")
        .and(Filter::or([Filter::equal("tags", "horror"), Filter::equal("series", "The Dark Tower")]))
        .and(Filter::one_of("rating", [300i64, 400, 500]));
    c.bench_function("compile filter", |b| {
        b.iter(|| compile_filter(EntityKind::Resource, black_box(&filter)))
    });
    let sort = SortSpec::Props(vec![
        ("authors".into(), Direction::Asc),
        ("series#groupIndex".into(), Direction::Asc),
        ("titleSort".into(), Direction::Desc),
    ]);
    c.bench_function("compile sort", |b| {
        b.iter(|| compile_sort(EntityKind::Resource, black_box(&sort)))
    });
}

criterion_group!(benches, templates, compilation);
criterion_main!(benches);
