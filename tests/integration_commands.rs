//! Integration tests for the command and query surface

use genealogy_ledger::aggregate::Aggregate;
use genealogy_ledger::handlers::{
    AddChildToFamilyCommand, CreateFamilyCommand, CreatePersonCommand, DeleteFamilyCommand,
    DeletePersonCommand, RemoveChildCommand, UpdateFamilyCommand, UpdatePersonCommand,
};
use genealogy_ledger::{DomainError, ErrorKind, OperationContext, RelationshipType, Sex};
use uuid::Uuid;

mod common;

#[tokio::test]
async fn test_family_lifecycle() {
    let app = common::in_memory();
    let ctx = OperationContext::new().with_actor("archivist");

    let george = app
        .create_person(CreatePersonCommand::new().with_name("George", "Byron").with_sex("M"), &ctx)
        .await
        .unwrap();
    let anne = app
        .create_person(CreatePersonCommand::new().with_name("Anne", "Milbanke").with_sex("F"), &ctx)
        .await
        .unwrap();
    let ada = app
        .create_person(
            CreatePersonCommand::new()
                .with_name("Ada", "Byron")
                .with_birth(Some("10 DEC 1815".to_string()), None),
            &ctx,
        )
        .await
        .unwrap();

    let family = app
        .create_family(
            CreateFamilyCommand::new()
                .with_partners(vec![george.id(), anne.id()])
                .with_marriage(Some("2 JAN 1815".to_string()), Some("Seaham Hall".to_string())),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(family.relationship(), RelationshipType::Marriage);

    app.add_child_to_family(AddChildToFamilyCommand::new(family.id(), ada.id()), &ctx)
        .await
        .unwrap();

    let view = app.get_family(family.id()).await.unwrap();
    assert_eq!(view.partners, vec![george.id(), anne.id()]);
    assert_eq!(view.children, vec![ada.id()]);
    assert_eq!(view.version, 2);

    let pedigree = app.pedigree(ada.id(), 2).await.unwrap();
    assert_eq!(pedigree.ancestors.len(), 3);
    assert_eq!(pedigree.ancestors[0].person.id, ada.id());
    assert_eq!(pedigree.ancestors[0].parents, vec![george.id(), anne.id()]);
    assert!(pedigree.ancestors[1..].iter().all(|e| e.generation == 1));

    let parents = app.pedigree(george.id(), 1).await.unwrap();
    assert_eq!(parents.children.len(), 1);
    assert_eq!(parents.children[0].id, ada.id());

    app.remove_child(RemoveChildCommand::new(family.id(), ada.id()), &ctx)
        .await
        .unwrap();
    let pedigree = app.pedigree(ada.id(), 2).await.unwrap();
    assert_eq!(pedigree.ancestors.len(), 1);

    app.delete_family(DeleteFamilyCommand::new(family.id()), &ctx)
        .await
        .unwrap();
    assert!(app.get_family(family.id()).await.unwrap_err().is_not_found());
    assert_eq!(app.list_families(0, 10).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_update_person_through_facade() {
    let app = common::in_memory();
    let ctx = OperationContext::new();
    let ada = app
        .create_person(CreatePersonCommand::new().with_name("Ada", "Lovelace"), &ctx)
        .await
        .unwrap();

    let updated = app
        .update_person(
            UpdatePersonCommand::new(ada.id())
                .with_sex("female")
                .with_death_date("27 NOV 1852"),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(updated.version(), 2);
    let view = app.get_person(ada.id()).await.unwrap();
    assert_eq!(view.sex, Sex::Female);
    assert!(!view.living);
    assert_eq!(view.death_date.unwrap().format(), "27 NOV 1852");
}

#[tokio::test]
async fn test_add_unknown_child_leaves_family_untouched() {
    let app = common::in_memory();
    let ctx = OperationContext::new();
    let family = app.create_family(CreateFamilyCommand::new(), &ctx).await.unwrap();

    let err = app
        .add_child_to_family(AddChildToFamilyCommand::new(family.id(), Uuid::new_v4()), &ctx)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(app.get_family(family.id()).await.unwrap().version, 1);
}

#[tokio::test]
async fn test_family_validation_errors() {
    let app = common::in_memory();
    let ctx = OperationContext::new();
    let a = app.create_person(CreatePersonCommand::new(), &ctx).await.unwrap();
    let b = app.create_person(CreatePersonCommand::new(), &ctx).await.unwrap();
    let c = app.create_person(CreatePersonCommand::new(), &ctx).await.unwrap();

    let err = app
        .create_family(CreateFamilyCommand::new().with_partners(vec![a.id(), b.id(), c.id()]), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.error_code(), "too_many_partners");

    let err = app
        .create_family(
            CreateFamilyCommand::new()
                .with_partners(vec![a.id()])
                .with_children(vec![a.id()]),
            &ctx,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        genealogy_ledger::AppError::Domain(DomainError::PartnerIsChild(id)) if id == a.id()
    ));

    let family = app
        .create_family(CreateFamilyCommand::new().with_partners(vec![a.id()]), &ctx)
        .await
        .unwrap();
    let err = app
        .update_family(UpdateFamilyCommand::new(family.id()).with_relationship("civil"), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_enumeration");
}

#[tokio::test]
async fn test_deleted_person_cannot_be_updated() {
    let app = common::in_memory();
    let ctx = OperationContext::new();
    let person = app.create_person(CreatePersonCommand::new(), &ctx).await.unwrap();
    app.delete_person(DeletePersonCommand::new(person.id()).with_reason("duplicate"), &ctx)
        .await
        .unwrap();

    let err = app
        .update_person(UpdatePersonCommand::new(person.id()).with_given_name("Ada"), &ctx)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_response().error_code, "not_found");
}
