use failure::{err_msg, Error};
use hoard::errors::MalformedTarget;
use hoard::pagination::Response;
use hoard::{Cloner, Config, Driver, Filter, MemoryTransport, Mode, WorkItem};
use std::path::PathBuf;
use std::sync::Mutex;

const ACME_REPOS: &str = r#"[
    {
        "id": 1,
        "name": "widget",
        "full_name": "acme/widget",
        "html_url": "https://github.com/acme/widget",
        "clone_url": "https://github.com/acme/widget.git",
        "fork": false
    },
    {
        "id": 2,
        "name": "gadget",
        "full_name": "acme/gadget",
        "html_url": "https://github.com/acme/gadget",
        "clone_url": "https://github.com/acme/gadget.git",
        "fork": false
    },
    {
        "id": 3,
        "name": "left-pad",
        "full_name": "acme/left-pad",
        "html_url": "https://github.com/acme/left-pad",
        "clone_url": "https://github.com/acme/left-pad.git",
        "fork": true
    }
]"#;

/// Pretends to clone, failing for anything with "broken" in its URL.
#[derive(Default)]
struct FakeCloner {
    cloned: Mutex<Vec<String>>,
}

impl Cloner for FakeCloner {
    async fn clone_repo(&self, item: &WorkItem) -> Result<String, Error> {
        tokio::task::yield_now().await;

        if item.clone_url.contains("broken") {
            return Err(err_msg("fatal: repository not found"));
        }

        self.cloned.lock().unwrap().push(item.clone_url.clone());
        Ok(item.clone_url.clone())
    }
}

fn config(root: &str) -> Config {
    let mut cfg = Config::default();
    cfg.general.root = PathBuf::from(root);
    cfg
}

#[tokio::test]
async fn list_an_organisations_sources() {
    let transport = MemoryTransport::new().respond(
        "https://api.github.com/users/acme/repos?type=sources&per_page=100",
        Response::ok(ACME_REPOS),
    );
    let driver = Driver::new(&config("backups"), Filter::default(), transport, FakeCloner::default());

    let target = driver.parse_target("https://github.com/acme", false).unwrap();
    let plan = driver.plan(&target).await.unwrap();

    assert_eq!(plan.mode, Mode::Listing);
    assert_eq!(plan.host, "github.com");
    assert_eq!(plan.owner.as_deref(), Some("acme"));
    let names: Vec<_> = plan.items.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["widget", "gadget"]);
    assert_eq!(plan.items[0].dest_dir, PathBuf::from("backups/acme/widget"));

    let summary = driver.execute(&plan).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed(), 0);
}

#[tokio::test]
async fn forks_can_be_asked_for_explicitly() {
    let transport = MemoryTransport::new().respond(
        "https://api.github.com/users/acme/repos?type=sources&per_page=100",
        Response::ok(ACME_REPOS),
    );
    let filter = Filter::resolve(false, false, false, true);
    let driver = Driver::new(&config("backups"), filter, transport, FakeCloner::default());

    let target = driver.parse_target("https://github.com/acme", false).unwrap();
    let plan = driver.plan(&target).await.unwrap();

    let names: Vec<_> = plan.items.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["left-pad"]);
}

#[tokio::test]
async fn clone_an_arbitrary_git_url_directly() {
    let driver = Driver::new(&config(""), Filter::default(), MemoryTransport::new(), FakeCloner::default());

    let target = driver.parse_target("https://example.org/team/tool.git", false).unwrap();
    let plan = driver.plan(&target).await.unwrap();

    assert_eq!(plan.mode, Mode::Direct);
    assert_eq!(
        plan.items,
        vec![WorkItem {
            name: String::from("tool"),
            clone_url: String::from("https://example.org/team/tool.git"),
            dest_dir: PathBuf::from("team/tool"),
        }]
    );

    let summary = driver.execute(&plan).await;
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn only_one_skips_the_listing() {
    let transport = MemoryTransport::new().respond(
        "https://api.github.com/users/acme/repos?type=sources&per_page=100",
        Response::ok(ACME_REPOS),
    );
    let driver = Driver::new(&config("backups"), Filter::default(), transport, FakeCloner::default());

    let target = driver.parse_target("https://github.com/acme/widget", true).unwrap();
    let plan = driver.plan(&target).await.unwrap();

    assert_eq!(plan.mode, Mode::Direct);
    assert_eq!(plan.items.len(), 1);
    assert_eq!(plan.items[0].dest_dir, PathBuf::from("backups/acme/widget"));
}

#[tokio::test]
async fn one_failure_doesnt_stop_the_others() {
    let repos = r#"[
        {"id": 1, "name": "a", "full_name": "acme/a", "clone_url": "https://github.com/acme/a.git"},
        {"id": 2, "name": "b", "full_name": "acme/b", "clone_url": "https://github.com/acme/broken.git"},
        {"id": 3, "name": "c", "full_name": "acme/c", "clone_url": "https://github.com/acme/c.git"}
    ]"#;
    let transport = MemoryTransport::new().respond(
        "https://api.github.com/users/acme/repos?type=sources&per_page=100",
        Response::ok(repos),
    );
    let mut cfg = config("backups");
    cfg.general.concurrency = 2;
    let driver = Driver::new(&cfg, Filter::default(), transport, FakeCloner::default());

    let target = driver.parse_target("https://github.com/acme", false).unwrap();
    let plan = driver.plan(&target).await.unwrap();
    let summary = driver.execute(&plan).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.failures[0].0.name, "b");
    assert_eq!(summary.failures[0].1.to_string(), "fatal: repository not found");
}

#[test]
fn malformed_targets_are_rejected() {
    let driver = Driver::new(&config("."), Filter::default(), MemoryTransport::new(), FakeCloner::default());

    let err = driver.parse_target("definitely not a url", false).unwrap_err();

    assert!(err.downcast_ref::<MalformedTarget>().is_some());
}
