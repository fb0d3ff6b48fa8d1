use std::cell::Cell;
use std::rc::Rc;

use dbcache::{
    CacheStore, CachedFunction, Error, FunctionDecl, Memoized, ParamDecl, ReturnValue, TypeDecl,
    Value,
};

fn image_decl() -> FunctionDecl {
    FunctionDecl::new("get_image")
        .param("card", TypeDecl::text())
        .param_with_default("size", TypeDecl::text(), "small".to_string())
        .returns(TypeDecl::text())
}

fn image_url(args: &[Value]) -> Result<ReturnValue, Error> {
    match args {
        [Value::Text(card), Value::Text(size)] => Ok(ReturnValue::Scalar(Value::Text(format!(
            "https://img.example/{}/{}.png",
            size, card
        )))),
        _ => unreachable!("bound arguments are always text"),
    }
}

#[test]
fn results_survive_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("func.db");

    let runs = Rc::new(Cell::new(0));
    {
        let store = CacheStore::open(&path);
        let counter = runs.clone();
        let square = Memoized::new(&store, "square", &["n"], move |(n,): (i64,)| {
            counter.set(counter.get() + 1);
            n * n
        })
        .unwrap();
        assert_eq!(square.call((12,)).unwrap(), 144);
        assert_eq!(square.call((12,)).unwrap(), 144);
    }
    assert_eq!(runs.get(), 1);

    let store = CacheStore::open(&path);
    let counter = runs.clone();
    let square = Memoized::new(&store, "square", &["n"], move |(n,): (i64,)| {
        counter.set(counter.get() + 1);
        n * n
    })
    .unwrap();
    assert_eq!(square.call((12,)).unwrap(), 144);
    assert_eq!(runs.get(), 1);

    assert_eq!(square.call((3,)).unwrap(), 9);
    assert_eq!(runs.get(), 2);
}

#[test]
fn default_and_explicit_arguments_share_a_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path().join("func.db"));

    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let image = CachedFunction::register(&store, image_decl(), move |args: &[Value]| {
        counter.set(counter.get() + 1);
        image_url(args)
    })
    .unwrap();

    let short = image.call(&[Value::Text("Karn".to_string())]).unwrap();
    let full = image
        .call(&[Value::Text("Karn".to_string()), Value::Text("small".to_string())])
        .unwrap();
    assert_eq!(short, full);
    assert_eq!(runs.get(), 1);

    image
        .call(&[Value::Text("Karn".to_string()), Value::Text("large".to_string())])
        .unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(image.table().len().unwrap(), 2);

    let tables = store.tables().unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "get_image");
    assert_eq!(tables[0].rows, 2);
}

#[test]
fn schema_on_disk_follows_the_signature() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path().join("func.db"));

    let _prices = Memoized::new(
        &store,
        "price",
        &["id", "foil"],
        |(id, foil): (i64, Option<bool>)| (id as f64 * 0.5, foil.map(|f| f.to_string())),
    )
    .unwrap();

    let columns = store.columns("price").unwrap();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "foil", "return_0", "return_1"]);

    let types: Vec<&str> = columns.iter().map(|c| c.declared_type.as_str()).collect();
    assert_eq!(types, ["INTEGER", "INTEGER", "REAL", "TEXT"]);

    assert!(columns[0].not_null && columns[0].primary_key);
    assert!(!columns[1].not_null && columns[1].primary_key);
    assert!(columns[2].not_null && !columns[2].primary_key);
    assert!(!columns[3].not_null);
}

#[test]
fn repeated_stores_keep_one_row_per_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path().join("func.db"));

    let label = Memoized::new(&store, "label", &["n"], |(n,): (Option<i64>,)| {
        n.map(|n| n.to_string()).unwrap_or_default()
    })
    .unwrap();

    for _ in 0..3 {
        label.recompute((Some(1),)).unwrap();
        label.recompute((None,)).unwrap();
    }
    assert_eq!(label.call((None,)).unwrap(), "");
    assert_eq!(store.count("label").unwrap(), 2);
}

#[test]
fn rejected_declarations_leave_the_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("func.db");
    let store = CacheStore::open(&path);

    let untyped = FunctionDecl::new("f").param("a", TypeDecl::int());
    assert!(matches!(
        CachedFunction::register(&store, untyped, image_url),
        Err(Error::MissingReturnType(name)) if name == "f"
    ));

    let unannotated = FunctionDecl::new("e")
        .push(ParamDecl::untyped("a"))
        .returns(TypeDecl::int());
    assert!(matches!(
        CachedFunction::register(&store, unannotated, image_url),
        Err(Error::MissingParameterType(name)) if name == "a"
    ));

    let bare_tuple = FunctionDecl::new("t")
        .param("a", TypeDecl::int())
        .returns("tuple".parse().unwrap());
    assert!(matches!(
        CachedFunction::register(&store, bare_tuple, image_url),
        Err(Error::UntypedTuple(_))
    ));

    let wide_union = FunctionDecl::new("g")
        .param("a", "int | str | None".parse().unwrap())
        .returns(TypeDecl::int());
    assert!(matches!(
        CachedFunction::register(&store, wide_union, image_url),
        Err(Error::UnsupportedUnion(_))
    ));

    let nested = FunctionDecl::new("h")
        .param("a", TypeDecl::int())
        .returns(TypeDecl::Tuple(vec![TypeDecl::Tuple(vec![TypeDecl::int()])]));
    assert!(matches!(
        CachedFunction::register(&store, nested, image_url),
        Err(Error::UnsupportedType(_))
    ));

    assert!(!path.exists());
}
