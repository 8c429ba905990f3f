// End-to-end pipelines modelled on the mail fan-out, comment ranking and
// population-by-prefix reports
use aggrelite_core::{AggregationError, Pipeline, PipelineOptions, ScalarUnwind};
use serde_json::{json, Value};

fn run(pipeline: Value, docs: &[Value]) -> Vec<Value> {
    Pipeline::from_json(&pipeline).unwrap().run(docs).unwrap()
}

fn messages() -> Vec<Value> {
    vec![
        json!({"_id": 1, "body": "q3 numbers", "headers": {"From": "a", "To": ["b", "c", "b"]}}),
        json!({"_id": 2, "body": "lunch?", "headers": {"From": "a", "To": ["c"]}}),
        json!({"_id": 3, "body": "re: lunch", "headers": {"From": "d", "To": ["b"]}}),
    ]
}

#[test]
fn test_from_to_fan_out() {
    let docs = vec![
        json!({"_id": 1, "headers": {"From": "a", "To": ["b", "c"]}}),
        json!({"_id": 2, "headers": {"From": "a", "To": ["b", "c"]}}),
    ];
    let out = run(
        json!([
            {"$unwind": "$headers.To"},
            {"$group": {"_id": {"from": "$headers.From", "to": "$headers.To"}, "count": {"$sum": 1}}},
            {"$sort": {"count": -1}}
        ]),
        &docs,
    );
    assert_eq!(
        out,
        vec![
            json!({"_id": {"from": "a", "to": "b"}, "count": 2}),
            json!({"_id": {"from": "a", "to": "c"}, "count": 2}),
        ]
    );
}

#[test]
fn test_from_to_fan_out_descriptor_dialect() {
    let docs = vec![
        json!({"_id": 1, "headers": {"From": "a", "To": ["b", "c"]}}),
        json!({"_id": 2, "headers": {"From": "a", "To": ["b", "c"]}}),
    ];
    let out = run(
        json!([
            {"kind": "unwind", "path": "headers.To"},
            {"kind": "group", "key": {"from": "headers.From", "to": "headers.To"},
             "accumulators": {"count": {"op": "sum", "of": 1}}},
            {"kind": "sort", "key": "count", "direction": -1}
        ]),
        &docs,
    );
    assert_eq!(out.len(), 2);
    for doc in &out {
        assert_eq!(doc["count"], 2);
        assert_eq!(doc["_id"]["from"], "a");
    }
}

#[test]
fn test_fan_out_counts_repeated_recipients() {
    let out = run(
        json!([
            {"$project": {"_id": 1, "headers": 1}},
            {"$unwind": "$headers.To"},
            {"$group": {"_id": {"from": "$headers.From", "to": "$headers.To"}, "count": {"$sum": 1}}},
            {"$sort": {"count": -1}}
        ]),
        &messages(),
    );
    assert_eq!(
        out,
        vec![
            json!({"_id": {"from": "a", "to": "b"}, "count": 2}),
            json!({"_id": {"from": "a", "to": "c"}, "count": 2}),
            json!({"_id": {"from": "d", "to": "b"}, "count": 1}),
        ]
    );
}

#[test]
fn test_fan_out_deduplicated_per_message() {
    let out = run(
        json!([
            {"$project": {"_id": 1, "headers": 1}},
            {"$unwind": "$headers.To"},
            {"$group": {"_id": "$_id", "headersFrom": {"$addToSet": "$headers.From"}, "headersTo": {"$addToSet": "$headers.To"}}},
            {"$unwind": "$headersFrom"},
            {"$unwind": "$headersTo"},
            {"$group": {"_id": {"from": "$headersFrom", "to": "$headersTo"}, "count": {"$sum": 1}}},
            {"$sort": {"count": -1}}
        ]),
        &messages(),
    );
    assert_eq!(
        out,
        vec![
            json!({"_id": {"from": "a", "to": "c"}, "count": 2}),
            json!({"_id": {"from": "a", "to": "b"}, "count": 1}),
            json!({"_id": {"from": "d", "to": "b"}, "count": 1}),
        ]
    );
}

fn posts() -> Vec<Value> {
    vec![
        json!({"_id": 1, "title": "first", "comments": [{"author": "ann", "body": "hi"}, {"author": "bo"}, {"author": "ann"}]}),
        json!({"_id": 2, "title": "second", "comments": [{"author": "bo"}, {"author": "cy"}]}),
        json!({"_id": 3, "title": "quiet", "comments": []}),
        json!({"_id": 4, "title": "draft"}),
    ]
}

fn ranking() -> Value {
    json!([
        {"$project": {"_id": 1, "comments": 1}},
        {"$unwind": "$comments"},
        {"$group": {"_id": "$comments.author", "num_comments": {"$sum": 1}}},
        {"$project": {"_id": 0, "author": "$_id", "num_comments": 1}},
        {"$sort": {"num_comments": -1}},
        {"$limit": 1}
    ])
}

#[test]
fn test_comment_ranking_tie_goes_to_first_seen_author() {
    let out = run(ranking(), &posts());
    assert_eq!(out, vec![json!({"author": "ann", "num_comments": 2})]);
}

#[test]
fn test_comment_ranking_strict_winner() {
    let mut docs = posts();
    docs.push(json!({"_id": 5, "comments": [{"author": "bo"}]}));
    let out = run(ranking(), &docs);
    assert_eq!(out, vec![json!({"author": "bo", "num_comments": 3})]);
}

#[test]
fn test_comment_ranking_output_field_order() {
    let out = run(ranking(), &posts());
    let keys: Vec<_> = out[0].as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["author", "num_comments"]);
}

fn zips() -> Vec<Value> {
    vec![
        json!({"_id": "01001", "city": "10TH STREET", "state": "MA", "pop": 100}),
        json!({"_id": "01002", "city": "ACMAR", "state": "AL", "pop": 50}),
        json!({"_id": "01003", "city": "4 CORNERS", "state": "OR", "pop": 25}),
        json!({"_id": "01004", "city": "", "state": "NY", "pop": 7}),
        json!({"_id": "01005", "city": "9 MILE", "state": "TX", "pop": 5.5}),
    ]
}

#[test]
fn test_population_by_digit_prefix() {
    let out = run(
        json!([
            {"$project": {"first_char": {"$substr": ["$city", 0, 1]}, "_id": 1, "city": 1, "state": 1, "pop": 1}},
            {"$match": {"first_char": {"$in": ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]}}},
            {"$group": {"_id": null, "total_pop": {"$sum": "$pop"}}}
        ]),
        &zips(),
    );
    assert_eq!(out, vec![json!({"_id": null, "total_pop": 130.5})]);
}

#[test]
fn test_population_by_digit_prefix_descriptor_dialect() {
    let out = run(
        json!([
            {"kind": "project", "fields": {"first_char": {"$substr": ["city", 0, 1]}, "pop": 1}},
            {"kind": "match", "filter": {"first_char": {"$in": ["1", "4", "9"]}}},
            {"kind": "group", "key": null, "accumulators": {"total_pop": {"op": "sum", "of": "pop"}}}
        ]),
        &zips(),
    );
    assert_eq!(out, vec![json!({"_id": null, "total_pop": 130.5})]);
}

#[test]
fn test_parse_error_yields_no_output() {
    let err = Pipeline::from_json(&json!([
        {"$unwind": "$comments"},
        {"$group": {"_id": "$comments.author", "n": {"$median": "$x"}}}
    ]))
    .unwrap_err();
    assert!(matches!(err, AggregationError::Stage(_)));
}

#[test]
fn test_strict_paths_fail_whole_run() {
    let pipeline = Pipeline::from_json(&json!([
        {"$project": {"_id": 1, "comments": 1}},
        {"$unwind": "$comments"}
    ]))
    .unwrap()
    .with_options(PipelineOptions::new().with_strict_field_paths(true));

    let err = pipeline.run(&posts()).unwrap_err();
    assert!(matches!(err, AggregationError::FieldPath(_)));
}

#[test]
fn test_scalar_recipient_policy() {
    let docs = vec![
        json!({"_id": 1, "headers": {"From": "a", "To": "b"}}),
        json!({"_id": 2, "headers": {"From": "a", "To": ["b"]}}),
    ];
    let pipeline = json!([
        {"$unwind": "$headers.To"},
        {"$group": {"_id": null, "count": {"$sum": 1}}}
    ]);

    assert_eq!(run(pipeline.clone(), &docs), vec![json!({"_id": null, "count": 1})]);

    let singleton = Pipeline::from_json(&pipeline)
        .unwrap()
        .with_options(PipelineOptions::new().with_scalar_unwind(ScalarUnwind::Singleton))
        .run(&docs)
        .unwrap();
    assert_eq!(singleton, vec![json!({"_id": null, "count": 2})]);
}
