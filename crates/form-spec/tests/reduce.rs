use form_spec::{
    ATTACHMENT_PREFIX, AutoSource, Constraint, FormChoice, FormField, FormIdentity, FormTemplate,
    QuestionType, RenderId, RenderState, ResponseReducer, SequenceCursor, SessionAutoValues,
    DigestAttachments, reduce,
};

fn reducer() -> ResponseReducer {
    ResponseReducer::new(
        SessionAutoValues::default()
            .with(AutoSource::Timestamp, "2026-03-01T08:00:00Z")
            .with(AutoSource::Driver, "D-17"),
        DigestAttachments,
    )
}

fn proof_of_delivery() -> FormTemplate {
    FormTemplate::new(
        FormIdentity::new("acme", "pod", "delivery"),
        vec![
            FormField::new("receiver", 1, QuestionType::Text).required(),
            FormField::new("photo", 2, QuestionType::Image),
            FormField::new("signed_at", 3, QuestionType::DateTime).with_auto(AutoSource::Timestamp),
            FormField::new("pieces", 4, QuestionType::Numeric)
                .with_default("1")
                .with_constraint(Constraint {
                    min: Some(1.0),
                    max: Some(10.0),
                    ..Constraint::default()
                }),
        ],
    )
}

fn started(template: &FormTemplate) -> RenderState {
    let mut state = RenderState::new(template);
    SequenceCursor::default().start(&mut state).expect("start");
    state
}

#[test]
fn reduce_is_idempotent() {
    let template = proof_of_delivery();
    let mut state = started(&template);
    let cursor = SequenceCursor::default();
    cursor.answer(&mut state, RenderId(1), "Dana").expect("answer");
    cursor.answer(&mut state, RenderId(2), "IMG_0001.jpg").expect("answer");

    let reducer = reducer();
    let first = reduce(&reducer, &state, &template);
    let second = reduce(&reducer, &state, &template);
    assert_eq!(first, second);
    assert!(first.is_submittable());
    assert_eq!(first.response["1"], "Dana");
    assert_eq!(first.response["3"], "2026-03-01T08:00:00Z");
    assert_eq!(first.response["4"], "1");
}

#[test]
fn required_empty_field_blocks_until_filled() {
    let template = proof_of_delivery();
    let mut state = started(&template);
    let reducer = reducer();

    let reduction = reduce(&reducer, &state, &template);
    assert!(!reduction.is_submittable());
    assert_eq!(reduction.errors.len(), 1);
    assert_eq!(reduction.errors[0].code, "missing_required");
    assert_eq!(reduction.errors[0].render_id, RenderId(1));

    state.apply_errors(&reduction.errors);
    assert!(state.field(RenderId(1)).expect("field").error_message.is_some());

    SequenceCursor::default()
        .answer(&mut state, RenderId(1), "Dana")
        .expect("answer");
    let reduction = reduce(&reducer, &state, &template);
    assert!(reduction.errors.is_empty());
    state.apply_errors(&reduction.errors);
    assert!(state.field(RenderId(1)).expect("field").error_message.is_none());
}

#[test]
fn constraint_failures_are_reported_without_dropping_values() {
    let template = proof_of_delivery();
    let mut state = started(&template);
    let cursor = SequenceCursor::default();
    cursor.answer(&mut state, RenderId(1), "Dana").expect("answer");
    cursor.answer(&mut state, RenderId(4), "40").expect("answer");

    let reduction = reduce(&reducer(), &state, &template);
    let codes: Vec<_> = reduction.errors.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes, vec!["above_maximum"]);
    assert_eq!(reduction.response["4"], "40");
    assert_eq!(reduction.response["1"], "Dana");
}

#[test]
fn image_answers_become_attachment_references() {
    let template = proof_of_delivery();
    let mut state = started(&template);
    SequenceCursor::default()
        .answer(&mut state, RenderId(2), "IMG_0001.jpg")
        .expect("answer");

    let reduction = reduce(&reducer(), &state, &template);
    let photo = &reduction.response["2"];
    assert!(photo.starts_with(ATTACHMENT_PREFIX));
    assert_eq!(photo.len(), ATTACHMENT_PREFIX.len() + 64);
    assert_eq!(
        state.field(RenderId(2)).map(|f| f.current_value.as_str()),
        Some("IMG_0001.jpg")
    );
}

#[test]
fn skipped_auto_fields_are_still_computed() {
    let template = FormTemplate::new(
        FormIdentity::new("acme", "exception", "delivery"),
        vec![
            FormField::new("outcome", 1, QuestionType::MultipleChoice).with_choices(vec![
                FormChoice::new("delivered"),
                FormChoice::jumping_to("refused", 3),
            ]),
            FormField::new("driver", 2, QuestionType::Text).with_auto(AutoSource::Driver),
            FormField::new("reason", 3, QuestionType::Text),
        ],
    );
    let mut state = started(&template);
    SequenceCursor::default()
        .answer(&mut state, RenderId(1), "refused")
        .expect("answer");

    let reduction = reduce(&reducer(), &state, &template);
    assert_eq!(reduction.response["1"], "refused");
    assert_eq!(reduction.response["2"], "D-17");
    assert_eq!(reduction.response["3"], "");
    assert!(reduction.is_submittable());
}

#[test]
fn choice_outside_list_is_rejected() {
    let template = FormTemplate::new(
        FormIdentity::new("acme", "survey", "delivery"),
        vec![
            FormField::new("mood", 1, QuestionType::MultipleChoice)
                .with_choices(vec![FormChoice::new("good"), FormChoice::new("bad")]),
        ],
    );
    let mut state = started(&template);
    SequenceCursor::default()
        .answer(&mut state, RenderId(1), "meh")
        .expect("answer");

    let reduction = reduce(&reducer(), &state, &template);
    assert_eq!(reduction.errors[0].code, "invalid_choice");
    assert_eq!(reduction.errors[0].key, "1");
}

fn plate_form(pattern: &str) -> FormTemplate {
    FormTemplate::new(
        FormIdentity::new("acme", "trailer", "pickup"),
        vec![FormField::new("plate", 1, QuestionType::Text).with_constraint(Constraint {
            pattern: Some(pattern.to_string()),
            ..Constraint::default()
        })],
    )
}

#[test]
fn pattern_is_enforced_on_every_reduce() {
    let template = plate_form("^[A-Z]{2}-[0-9]{3}$");
    let cursor = SequenceCursor::default();
    let mut state = started(&template);
    let reducer = reducer();

    cursor.answer(&mut state, RenderId(1), "ab-12").expect("answer");
    let reduction = reduce(&reducer, &state, &template);
    assert_eq!(reduction.errors[0].code, "pattern_mismatch");

    cursor.answer(&mut state, RenderId(1), "AB-123").expect("answer");
    assert!(reduce(&reducer, &state, &template).is_submittable());
}

#[test]
fn uncompilable_pattern_fails_closed() {
    // Skips check_template, which would reject the pattern up front.
    let template = plate_form("^[A-Z(");
    let mut state = started(&template);
    SequenceCursor::default()
        .answer(&mut state, RenderId(1), "AB-123")
        .expect("answer");

    let reduction = reduce(&reducer(), &state, &template);
    assert!(!reduction.is_submittable());
    assert_eq!(reduction.errors[0].code, "invalid_pattern");
    assert_eq!(reduction.response["1"], "AB-123");
}
