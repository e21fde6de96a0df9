//! A document's life through a booted runtime: access, rendering, deletion.

use edms_converter::{ProcessOutput, ScriptedRunner, Transformation};
use edms_core::{Role, TargetKind, TargetRef, User};
use edms_registry::apps::documents::{self, DOCUMENT_EDIT, DOCUMENT_VIEW};
use edms_registry::Runtime;
use edms_storage::AccessStorage;
use edms_test_utils::assertions::{assert_converter_error, assert_permission_denied};
use edms_test_utils::fixtures::config_with_tools;
use std::fs;
use std::sync::Arc;
use uuid::Uuid;

struct World {
    dir: tempfile::TempDir,
    runner: Arc<ScriptedRunner>,
    runtime: Runtime,
}

fn world() -> World {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    let runtime = Runtime::boot(config_with_tools(dir.path()), runner.clone()).unwrap();
    World {
        dir,
        runner,
        runtime,
    }
}

fn target(kind: TargetKind) -> TargetRef {
    TargetRef::new(kind, Uuid::now_v7())
}

#[test]
fn type_level_grant_reaches_document_pages() {
    let w = world();
    let services = w.runtime.services();
    let storage = services.storage.as_ref();

    let reader = User::new("reader");
    let stranger = User::new("stranger");
    storage.user_insert(&reader).unwrap();
    storage.user_insert(&stranger).unwrap();
    let role = Role::new("Readers").with_user(reader.user_id);
    storage.role_insert(&role).unwrap();

    let document_type = target(TargetKind::DocumentType);
    let document = target(TargetKind::Document);
    let version = target(TargetKind::DocumentVersion);
    let page = target(TargetKind::DocumentPage);
    services.link_document_type(document, document_type).unwrap();
    services.relations.link(version, document).unwrap();
    services.relations.link(page, version).unwrap();

    let view = documents::permission(DOCUMENT_VIEW);
    w.runtime.acl().grant(document_type, role.role_id, &[view.clone()]).unwrap();

    w.runtime.acl().check_access(&view, &reader, page).unwrap();
    assert_permission_denied(&w.runtime.acl().check_access(&view, &stranger, page));
    assert_permission_denied(&w.runtime.acl().check_access(
        &documents::permission(DOCUMENT_EDIT),
        &reader,
        page,
    ));
}

#[test]
fn rendered_pages_are_cached_until_the_document_is_deleted() {
    let w = world();
    let services = w.runtime.services();
    let source = w.dir.path().join("scan.tiff");
    fs::write(&source, b"II*\0").unwrap();
    let document = target(TargetKind::Document);
    let partition = document.object_id.to_string();

    let request = services
        .converter
        .request(&source)
        .with_page(2)
        .with_transformation(Transformation::Resize {
            width: 800,
            height: None,
        })
        .with_transformation(Transformation::rotate(90));

    w.runner.push_creating(b"page two".to_vec());
    let first = services.pages.convert(&partition, &request, None).unwrap();
    let second = services.pages.convert(&partition, &request, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read(&first).unwrap(), b"page two");
    assert_eq!(w.runner.invocation_count(), 1);

    let args = &w.runner.invocations()[0].args;
    let resize = args.iter().position(|a| a == "-resize").unwrap();
    let rotate = args.iter().position(|a| a == "-rotate").unwrap();
    assert!(resize < rotate);
    assert!(args.iter().any(|a| a.ends_with("scan.tiff[1]")));

    assert_eq!(services.delete_document(document).unwrap(), 1);
    assert!(!first.exists());

    w.runner.push_creating(b"page two again".to_vec());
    services.pages.convert(&partition, &request, None).unwrap();
    assert_eq!(w.runner.invocation_count(), 2);
}

#[test]
fn office_documents_go_through_pdf() {
    let w = world();
    let services = w.runtime.services();
    let source = w.dir.path().join("letter.docx");
    fs::write(&source, b"PK\x03\x04").unwrap();

    w.runner.push_creating(b"%PDF-1.7".to_vec());
    w.runner.push_creating(b"jpeg bytes".to_vec());
    let request = services.converter.request(&source);
    let page = services.pages.convert("letter", &request, None).unwrap();
    assert_eq!(fs::read(page).unwrap(), b"jpeg bytes");

    let invocations = w.runner.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations[0].args.iter().any(|a| a == "--headless"));
    let pdf = services.converter.office_pdf_path(&source);
    assert!(pdf.exists());
    assert!(invocations[1]
        .args
        .iter()
        .any(|a| a.starts_with(&pdf.display().to_string())));
}

#[test]
fn failed_render_leaves_cache_empty() {
    let w = world();
    let services = w.runtime.services();
    let source = w.dir.path().join("broken.png");
    fs::write(&source, b"not a png").unwrap();

    w.runner.push(ProcessOutput::failed(
        1,
        "convert: no decode delegate for this image format `' @ error/constitute.c/ReadImage/504.",
    ));
    let request = services.converter.request(&source);
    assert_converter_error(&services.pages.convert("broken", &request, None));
    assert_eq!(services.pages.cache().total_size().unwrap(), 0);
}

#[test]
fn cleanup_purges_caches() {
    let w = world();
    let services = w.runtime.services();
    let source = w.dir.path().join("photo.jpg");
    fs::write(&source, b"\xff\xd8").unwrap();
    w.runner.push_creating(b"thumbnail".to_vec());
    let request = services.converter.request(&source);
    let page = services.pages.convert("photo", &request, None).unwrap();
    assert!(page.exists());

    assert_eq!(w.runtime.cleanup().unwrap(), 2);
    assert!(!page.exists());
    assert_eq!(services.pages.cache().total_size().unwrap(), 0);
}

#[test]
fn cache_budget_holds_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_tools(dir.path());
    config.caches[0].maximum_size = 10;
    let cache_directory = config.caches[0].directory.clone();
    let first_source = dir.path().join("first.png");
    let second_source = dir.path().join("second.png");
    fs::write(&first_source, b"\x89PNG").unwrap();
    fs::write(&second_source, b"\x89PNG").unwrap();

    let first_page = {
        let runner = Arc::new(ScriptedRunner::new());
        let runtime = Runtime::boot(config.clone(), runner.clone()).unwrap();
        let services = runtime.services();
        runner.push_creating(b"8 bytes!".to_vec());
        let request = services.converter.request(&first_source);
        services.pages.convert("first", &request, None).unwrap()
    };

    let runner = Arc::new(ScriptedRunner::new());
    let runtime = Runtime::boot(config, runner.clone()).unwrap();
    let services = runtime.services();
    let request = services.converter.request(&first_source);
    assert_eq!(services.pages.convert("first", &request, None).unwrap(), first_page);
    assert_eq!(runner.invocation_count(), 0);
    assert_eq!(services.pages.cache().total_size().unwrap(), 8);

    runner.push_creating(b"8 more!!".to_vec());
    let request = services.converter.request(&second_source);
    services.pages.convert("second", &request, None).unwrap();
    services.pages.cache().prune().unwrap();

    let on_disk: u64 = fs::read_dir(&cache_directory)
        .unwrap()
        .map(|entry| entry.unwrap())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.metadata().unwrap().len())
        .sum();
    assert!(on_disk <= 10, "{on_disk} bytes on disk over a 10 byte budget");
    assert!(services.pages.cache().total_size().unwrap() <= 10);
    assert!(!first_page.exists());
}
