//! Property-based tests of the read path.
//!
//! Random filters over random documents are checked against a brute-force
//! evaluation: the store-side query must return a superset of the matching
//! documents, and the rows that come out of the stream must be exactly the
//! matching ones, in store order.

mod common;

use common::{Fixture, Person, int, text};
use docbridge_adapters::remote::RemoteCache;
use docbridge_engine::{BinaryOp, Expression, RelationalQuery, TableRef};
use proptest::prelude::*;

const NAMES: &[&str] = &["ann", "bob", "cid", "o'neil"];
const NOTES: &[&str] = &["vip", "new", "gone"];
const NUMBERS: &[&str] = &["111", "222", "333"];

/// A filter over one person row, optionally bound to one phone.
#[derive(Debug, Clone)]
enum Pred {
    Age(BinaryOp, i32),
    Name(&'static str),
    Notes(&'static str),
    Number(BinaryOp, &'static str),
    And(Box<Pred>, Box<Pred>),
    Or(Box<Pred>, Box<Pred>),
    Not(Box<Pred>),
}

impl Pred {
    fn expression(&self) -> Expression {
        match self {
            Self::Age(op, age) => Expression::binary(
                Expression::column("age"),
                *op,
                Expression::literal(*age),
            ),
            Self::Name(name) => Expression::binary(
                Expression::column("name"),
                BinaryOp::Eq,
                Expression::literal(*name),
            ),
            Self::Notes(notes) => Expression::binary(
                Expression::literal(*notes),
                BinaryOp::Eq,
                Expression::column("notes"),
            ),
            Self::Number(op, number) => Expression::binary(
                Expression::qualified("Phone", "number"),
                *op,
                Expression::literal(*number),
            ),
            Self::And(l, r) => l.expression().and(r.expression()),
            Self::Or(l, r) => l.expression().or(r.expression()),
            Self::Not(inner) => inner.expression().negate(),
        }
    }

    fn holds(&self, person: &Person, phone: Option<&str>) -> bool {
        match self {
            Self::Age(op, age) => compare(*op, person.age.cmp(age)),
            Self::Name(name) => person.name == *name,
            Self::Notes(notes) => person.notes == *notes,
            Self::Number(op, number) => {
                compare(*op, phone.expect("bound phone").cmp(number))
            }
            Self::And(l, r) => l.holds(person, phone) && r.holds(person, phone),
            Self::Or(l, r) => l.holds(person, phone) || r.holds(person, phone),
            Self::Not(inner) => !inner.holds(person, phone),
        }
    }
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::{Equal, Greater, Less};
    match op {
        BinaryOp::Eq => ordering == Equal,
        BinaryOp::Ne => ordering != Equal,
        BinaryOp::Lt => ordering == Less,
        BinaryOp::Le => ordering != Greater,
        BinaryOp::Gt => ordering == Greater,
        BinaryOp::Ge => ordering != Less,
        other => unreachable!("{other:?} is not a comparison"),
    }
}

fn comparison() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Eq),
        Just(BinaryOp::Ne),
        Just(BinaryOp::Lt),
        Just(BinaryOp::Le),
        Just(BinaryOp::Gt),
        Just(BinaryOp::Ge),
    ]
}

fn tree(leaf: BoxedStrategy<Pred>) -> impl Strategy<Value = Pred> {
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Pred::And(Box::new(l), Box::new(r))),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Pred::Or(Box::new(l), Box::new(r))),
            inner.prop_map(|p| Pred::Not(Box::new(p))),
        ]
    })
}

fn root_leaf() -> BoxedStrategy<Pred> {
    prop_oneof![
        (comparison(), 0..40i32).prop_map(|(op, age)| Pred::Age(op, age)),
        prop::sample::select(NAMES).prop_map(Pred::Name),
        prop::sample::select(NOTES).prop_map(Pred::Notes),
    ]
    .boxed()
}

fn phone_leaf() -> BoxedStrategy<Pred> {
    prop_oneof![
        root_leaf(),
        (comparison(), prop::sample::select(NUMBERS)).prop_map(|(op, n)| Pred::Number(op, n)),
    ]
    .boxed()
}

fn people(max: usize, max_phones: usize) -> impl Strategy<Value = Vec<Person>> {
    prop::collection::vec(
        (
            0..40i32,
            prop::sample::select(NAMES),
            prop::sample::select(NOTES),
            prop::collection::vec(prop::sample::select(NUMBERS), 0..=max_phones),
        ),
        0..max,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(id, (age, name, notes, phones))| {
                let id = i32::try_from(id).expect("small id");
                phones
                    .into_iter()
                    .fold(Person::new(id, name, age).notes(notes), |p, n| p.phone(n, 0))
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: the store returns a superset, the stream returns the exact
    /// matching rows.
    #[test]
    fn root_filters_are_exact(all in people(12, 0), pred in tree(root_leaf())) {
        let fixture = Fixture::new(&all);
        let query = RelationalQuery::select_from(TableRef::new("Person"))
            .column("id")
            .filter(pred.expression());

        let translated = fixture.connector.translate(query.clone()).unwrap();
        let native = fixture.cache.fetch_page(&translated.query, 0, 1_000).unwrap();
        let expected: Vec<_> = all.iter().filter(|p| pred.holds(p, None)).collect();
        for person in &expected {
            prop_assert!(native.contains(&person.encode()), "store dropped {:?}", person);
        }

        let rows = fixture.connector.query_rows(query).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| int(r, 0)).collect();
        let want: Vec<_> = expected.iter().map(|p| i64::from(p.id)).collect();
        prop_assert_eq!(ids, want);
    }

    /// Property: filters over an unwound repeated group keep exactly the
    /// matching (document, element) bindings.
    #[test]
    fn unwound_filters_are_exact(all in people(8, 3), pred in tree(phone_leaf())) {
        let fixture = Fixture::new(&all);
        let query = RelationalQuery::select_from(TableRef::new("Person"))
            .column("id")
            .qualified("Phone", "number")
            .join(TableRef::new("Phone"))
            .filter(pred.expression());

        let translated = fixture.connector.translate(query.clone()).unwrap();
        prop_assert!(!translated.native_paging);
        let native = fixture.cache.fetch_page(&translated.query, 0, 1_000).unwrap();

        let mut want = Vec::new();
        for person in &all {
            let kept: Vec<_> = person
                .phones
                .iter()
                .filter(|(n, _)| pred.holds(person, Some(n)))
                .map(|(n, _)| (i64::from(person.id), n.clone()))
                .collect();
            if !kept.is_empty() {
                prop_assert!(native.contains(&person.encode()), "store dropped {:?}", person);
            }
            want.extend(kept);
        }

        let rows = fixture.connector.query_rows(query).unwrap();
        let got: Vec<_> = rows
            .iter()
            .map(|r| (int(r, 0), text(r, 1).unwrap()))
            .collect();
        prop_assert_eq!(got, want);
    }

    /// Property: limit and offset select the same window natively and
    /// client-side.
    #[test]
    fn row_window_matches_slice(
        count in 0..15i32,
        limit in 0usize..6,
        offset in 0usize..6,
        batch in 1usize..5,
        client_side in any::<bool>(),
    ) {
        let all: Vec<_> = (0..count).map(|i| Person::new(i, "ann", i).notes("vip")).collect();
        let fixture = Fixture::with_config(
            &all,
            docbridge_engine::Config::default().with_batch_size(batch),
        );
        let mut query = RelationalQuery::select_from(TableRef::new("Person"))
            .column("id")
            .limit(limit)
            .offset(offset);
        if client_side {
            query = query.filter(Expression::binary(
                Expression::column("notes"),
                BinaryOp::Eq,
                Expression::literal("vip"),
            ));
        }

        let rows = fixture.connector.query_rows(query).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| int(r, 0)).collect();
        let want: Vec<_> = (0..i64::from(count)).skip(offset).take(limit).collect();
        prop_assert_eq!(ids, want);
        prop_assert!(fixture.connection.registry().is_empty());
    }
}
