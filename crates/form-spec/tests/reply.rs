use std::collections::BTreeMap;

use form_spec::{
    Advance, FormChoice, FormError, FormField, FormIdentity, FormTemplate, NavigationSignal,
    QuestionType, RenderId, ReplyKind, ReplyLinkCoordinator, ReplyPolicy, SequenceCursor,
    StageKind, StageSource,
};

fn primary(editable: bool) -> FormTemplate {
    let mut template = FormTemplate::new(
        FormIdentity::new("acme", "inspection", "pretrip"),
        vec![
            FormField::new("tires", 1, QuestionType::MultipleChoice).with_choices(vec![
                FormChoice::new("ok"),
                FormChoice::jumping_to("worn", 3),
            ]),
            FormField::new("odometer", 2, QuestionType::Numeric).with_default("0"),
            FormField::new("remarks", 3, QuestionType::Text),
            FormField::new("sign", 4, QuestionType::Signature),
            FormField::new("lights", 5, QuestionType::Text).with_default("ok"),
        ],
    );
    template.is_driver_editable = editable;
    template
}

fn reply_template() -> FormTemplate {
    FormTemplate::new(
        FormIdentity::new("acme", "inspection-ack", "pretrip"),
        vec![FormField::new("ack", 1, QuestionType::Text).required()],
    )
}

fn coordinator(kind: ReplyKind, editable: bool) -> ReplyLinkCoordinator {
    let template = primary(editable);
    let policy = ReplyPolicy::new(kind, template.identity.clone());
    let reply = (kind == ReplyKind::ReplyWithNew).then(reply_template);
    ReplyLinkCoordinator::new(policy, template, reply, SequenceCursor::default())
        .expect("coordinator")
}

fn visible_pairs(coordinator: &ReplyLinkCoordinator, index: usize) -> Vec<(String, String)> {
    coordinator.stages()[index]
        .state
        .visible_fields()
        .into_iter()
        .map(|field| (field.response_key(), field.current_value.clone()))
        .collect()
}

#[test]
fn freeform_policy_shows_a_single_stage() {
    let mut coordinator = coordinator(ReplyKind::ReplyWithFreeform, true);
    assert_eq!(coordinator.stages().len(), 1);
    assert_eq!(coordinator.active_stage().kind, StageKind::Freeform);

    assert_eq!(coordinator.enter(0).expect("enter"), Advance::Complete);
    assert_eq!(coordinator.active_stage().state.visible_fields().len(), 1);
    assert_eq!(
        coordinator.complete_active().expect("complete"),
        NavigationSignal::Complete
    );
}

#[test]
fn no_reply_with_editable_primary_mirrors_it() {
    let mut coordinator = coordinator(ReplyKind::NoReply, true);
    assert_eq!(coordinator.stages().len(), 2);
    assert_eq!(coordinator.stages()[1].source, StageSource::MirrorOfPrimary);

    coordinator.enter(0).expect("enter");
    coordinator.answer(RenderId(1), "ok").expect("answer");
    coordinator.answer(RenderId(2), "120455").expect("answer");

    assert_eq!(
        coordinator.complete_active().expect("complete"),
        NavigationSignal::Continue(StageKind::Reply)
    );
    assert_eq!(visible_pairs(&coordinator, 1), visible_pairs(&coordinator, 0));
    assert!(!coordinator.active_stage().read_only);
}

#[test]
fn no_reply_with_fixed_primary_completes_after_it() {
    let mut coordinator = coordinator(ReplyKind::NoReply, false);
    assert_eq!(coordinator.stages().len(), 1);
    coordinator.enter(0).expect("enter");
    assert_eq!(
        coordinator.complete_active().expect("pending"),
        NavigationSignal::Continue(StageKind::Primary)
    );
    coordinator.answer(RenderId(1), "worn").expect("answer");
    assert_eq!(
        coordinator.complete_active().expect("complete"),
        NavigationSignal::Complete
    );
}

#[test]
fn reply_with_same_is_read_only() {
    let mut coordinator = coordinator(ReplyKind::ReplyWithSame, false);
    coordinator.enter(0).expect("enter");
    coordinator.answer(RenderId(1), "ok").expect("answer");
    coordinator.complete_active().expect("complete");

    let stage = coordinator.active_stage();
    assert_eq!(stage.kind, StageKind::Reply);
    assert!(stage.read_only);
    assert!(stage.mirrors_primary());
    assert_eq!(visible_pairs(&coordinator, 1), visible_pairs(&coordinator, 0));
    assert_eq!(
        coordinator.answer(RenderId(2), "1"),
        Err(FormError::ReadOnlyStage)
    );
}

#[test]
fn back_restores_previous_stage_exactly() {
    let mut coordinator = coordinator(ReplyKind::ReplyWithNew, false);
    coordinator.enter(0).expect("enter");
    coordinator.answer(RenderId(1), "worn").expect("answer");
    coordinator.answer(RenderId(2), "88").expect("answer");
    let snapshot = coordinator.active_stage().state.clone();

    coordinator.complete_active().expect("complete");
    assert_eq!(coordinator.active_stage().kind, StageKind::Reply);
    coordinator.answer(RenderId(1), "seen").expect("reply answer");

    assert_eq!(coordinator.back(), Some(StageKind::Primary));
    assert_eq!(coordinator.active_stage().state, snapshot);
    assert_eq!(coordinator.back(), None);

    coordinator.complete_active().expect("forward again");
    let reply = coordinator.active_stage();
    assert_eq!(
        reply.state.field(RenderId(1)).map(|f| f.current_value.as_str()),
        Some("seen")
    );
}

#[test]
fn reply_with_new_requires_reply_template() {
    let template = primary(false);
    let policy = ReplyPolicy::new(ReplyKind::ReplyWithNew, template.identity.clone());
    let err = ReplyLinkCoordinator::new(policy, template, None, SequenceCursor::default())
        .expect_err("missing reply");
    assert!(matches!(err, FormError::InvalidTemplate { .. }));
}

#[test]
fn synced_stages_replay_priors_read_only() {
    let mut coordinator = coordinator(ReplyKind::NoReply, false);
    coordinator
        .stage_mut(0)
        .expect("primary")
        .state
        .prior_values
        .extend(BTreeMap::from([
            ("1".to_string(), "worn".to_string()),
            ("3".to_string(), "left rear".to_string()),
        ]));
    coordinator.mark_synced();

    assert_eq!(coordinator.enter(0).expect("enter"), Advance::Complete);
    assert_eq!(
        visible_pairs(&coordinator, 0),
        vec![
            ("1".to_string(), "worn".to_string()),
            ("3".to_string(), "left rear".to_string()),
            ("4".to_string(), String::new()),
            ("5".to_string(), "ok".to_string()),
        ]
    );
    assert_eq!(
        coordinator.answer(RenderId(1), "ok"),
        Err(FormError::ReadOnlyStage)
    );
}
