//! Integration tests using wiremock to simulate HTTP services.

use http::Method;
use restract::paging::{LinkedPage, PagedResult, ResettableResult, SortDescriptor, SortedList, SortedResult};
use restract::{
    ApiResponse, Arg, BodySerialization, Client, Composite, ContractDescriptor, Error, Json,
    MethodDescriptor, MultipartItem, Parameter, RawResponse, ReturnShape, RetryStrategy, Service, TypeTag,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{
    body_json, body_string, body_string_contains, header, method, path, query_param,
    query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Item {
    id: u32,
    name: String,
}

fn item(id: u32, name: &str) -> Item {
    Item {
        id,
        name: name.to_string(),
    }
}

fn items_contract() -> ContractDescriptor {
    let m = |name: &str| MethodDescriptor::builder("Items", name);
    let build = |b: restract::descriptor::MethodDescriptorBuilder| b.build().unwrap();

    ContractDescriptor::builder("Items")
        .method(build(
            m("get_item")
                .http(Method::GET, "/items/{id}")
                .param(Parameter::path("id", TypeTag::of::<u32>()))
                .param(Parameter::query("verbose", TypeTag::of::<bool>()))
                .returns(ReturnShape::Value, TypeTag::of::<Item>()),
        ))
        .method(build(
            m("try_get_item")
                .http(Method::GET, "/items/{id}")
                .param(Parameter::path("id", TypeTag::of::<u32>()))
                .returns_shape(ReturnShape::Envelope(Box::new(ReturnShape::Value))),
        ))
        .method(build(
            m("create_item")
                .http(Method::POST, "/items")
                .param(Parameter::body("item", TypeTag::of::<Item>(), BodySerialization::Json))
                .returns(ReturnShape::Value, TypeTag::of::<Item>()),
        ))
        .method(build(
            m("list_items")
                .http(Method::GET, "/items")
                .param(Parameter::query("page", TypeTag::of::<u32>()))
                .param(Parameter::query("pageSize", TypeTag::of::<u32>()))
                .returns(ReturnShape::Paged, TypeTag::of::<Item>()),
        ))
        .method(build(
            m("sorted_items")
                .http(Method::GET, "/sorted")
                .param(Parameter::query("sort", TypeTag::of::<String>()))
                .returns(ReturnShape::Sorted, TypeTag::of::<Item>()),
        ))
        .method(build(
            m("tags")
                .http(Method::GET, "/tags")
                .returns(ReturnShape::Enumerable, TypeTag::of::<String>()),
        ))
        .method(build(
            m("raw")
                .http(Method::GET, "/raw")
                .returns_shape(ReturnShape::RawResponse),
        ))
        .method(build(
            m("slow")
                .http(Method::GET, "/slow")
                .param(Parameter::cancellation("cancel"))
                .returns_shape(ReturnShape::Text),
        ))
        .method(build(
            m("login")
                .http(Method::POST, "/login")
                .param(Parameter::body("form", TypeTag::named("Login"), BodySerialization::UrlEncoded))
                .returns_shape(ReturnShape::Unit),
        ))
        .method(build(
            m("whoami")
                .http(Method::GET, "/me")
                .param(Parameter::authorization("token", "Bearer"))
                .param(Parameter::header("tenant", "X-Tenant", TypeTag::of::<String>()))
                .returns_shape(ReturnShape::Text),
        ))
        .method(build(
            m("upload")
                .http(Method::POST, "/uploads")
                .multipart()
                .param(Parameter::field("file", TypeTag::named("part")))
                .param(Parameter::field("comment", TypeTag::of::<String>()))
                .returns_shape(ReturnShape::Unit),
        ))
        .method(build(
            m("find")
                .http(Method::GET, "/find")
                .param(Parameter::query("name", TypeTag::of::<String>()))
                .returns_shape(ReturnShape::Text),
        ))
        .method(build(
            m("find")
                .http(Method::GET, "/find")
                .param(Parameter::query("id", TypeTag::of::<u32>()))
                .returns_shape(ReturnShape::Text),
        ))
        .build()
        .unwrap()
}

fn service(server: &MockServer) -> Service {
    Client::builder()
        .base_url(server.uri())
        .unwrap()
        .build()
        .unwrap()
        .service(items_contract())
}

#[tokio::test]
async fn test_get_with_path_and_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/7"))
        .and(query_param("verbose", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item(7, "seven")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let found: Json<Item> = service(&mock_server)
        .call("get_item")
        .arg(7u32)
        .arg(true)
        .send()
        .await
        .unwrap();

    assert_eq!(found.into_inner(), item(7, "seven"));
}

#[tokio::test]
async fn test_post_serializes_json_body() {
    let mock_server = MockServer::start().await;
    let new_item = item(0, "new");

    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json; charset=utf-8"))
        .and(body_json(&new_item))
        .respond_with(ResponseTemplate::new(201).set_body_json(item(1, "new")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let created: Json<Item> = service(&mock_server)
        .call("create_item")
        .arg_serialized(&new_item)
        .unwrap()
        .send()
        .await
        .unwrap();

    assert_eq!(created.id, 1);
}

#[tokio::test]
async fn test_bad_request_carries_error_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": 17,
            "message": "verbose must be set"
        })))
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .call("get_item")
        .arg(1u32)
        .arg(Arg::Null)
        .send::<Json<Item>>()
        .await;

    match result {
        Err(Error::RemoteService {
            status,
            error_message: Some(message),
            ..
        }) => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(message.code, 17);
            assert_eq!(message.message.as_deref(), Some("verbose must be set"));
        }
        other => panic!("Expected RemoteService with payload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_deserialization_error_keeps_raw_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let err = service(&mock_server)
        .call("get_item")
        .arg(2u32)
        .arg(false)
        .send::<Json<Item>>()
        .await
        .unwrap_err();

    match err {
        Error::Deserialization {
            status,
            raw_response,
            ..
        } => {
            assert_eq!(status.as_u16(), 200);
            assert_eq!(raw_response, "not json");
        }
        other => panic!("Expected Deserialization, got {:?}", other),
    }
}

#[tokio::test]
async fn test_envelope_absorbs_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .mount(&mock_server)
        .await;

    let response: ApiResponse<Json<Item>> = service(&mock_server)
        .call("try_get_item")
        .arg(404u32)
        .send()
        .await
        .unwrap();

    assert!(!response.is_success());
    assert_eq!(response.status().as_u16(), 404);
    assert!(response.content().is_none());
    assert_eq!(response.error().and_then(Error::raw_response), Some("missing"));
}

#[tokio::test]
async fn test_no_content_yields_empty_sequence() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tags"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let tags: Vec<String> = service(&mock_server).call("tags").send().await.unwrap();
    assert!(tags.is_empty());
}

#[tokio::test]
async fn test_wrong_result_type_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let err = service(&mock_server)
        .call("tags")
        .send::<Json<Vec<String>>>()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ContractDefinition(_)));
}

#[tokio::test]
async fn test_raw_response_is_not_classified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/raw"))
        .respond_with(
            ResponseTemplate::new(503)
                .insert_header("retry-after", "3")
                .set_body_string("busy"),
        )
        .mount(&mock_server)
        .await;

    let raw: RawResponse = service(&mock_server).call("raw").send().await.unwrap();
    assert_eq!(raw.status().as_u16(), 503);
    assert_eq!(
        raw.headers().get("retry-after").and_then(|v| v.to_str().ok()),
        Some("3")
    );
    assert_eq!(raw.text().await.unwrap(), "busy");
}

#[tokio::test]
async fn test_cancellation_argument_interrupts_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = service(&mock_server)
        .call("slow")
        .arg(cancel)
        .send::<String>()
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_form_body_and_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("user_name=bob&password=pw+1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer abc"))
        .and(header("x-tenant", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_string("bob"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let items = service(&mock_server);
    let form = Composite::new("Login")
        .field("user_name", "bob")
        .field("password", "pw 1");
    items.call("login").arg(form).send::<()>().await.unwrap();

    let me: String = items
        .call("whoami")
        .arg("abc")
        .arg("acme")
        .send()
        .await
        .unwrap();
    assert_eq!(me, "bob");
}

#[tokio::test]
async fn test_multipart_upload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/uploads"))
        .and(body_string_contains("name=\"comment\"\r\n"))
        .and(body_string_contains("filename=\"notes.csv\""))
        .and(body_string_contains("a,b\n1,2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let file = MultipartItem::bytes("a,b\n1,2")
        .file_name("notes.csv")
        .content_type("text/csv");
    service(&mock_server)
        .call("upload")
        .arg(file)
        .arg("first upload")
        .send::<()>()
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
}

#[tokio::test]
async fn test_overloads_resolve_by_parameter_type() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/find"))
        .and(query_param("id", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("by id"))
        .mount(&mock_server)
        .await;

    let items = service(&mock_server);
    let found: String = items
        .call("find")
        .types([TypeTag::of::<u32>()])
        .arg(5u32)
        .send()
        .await
        .unwrap();
    assert_eq!(found, "by id");

    let err = items.call("find").arg(5u32).send::<String>().await.unwrap_err();
    assert!(matches!(err, Error::AmbiguousMethod { candidates: 2, .. }));
}

#[tokio::test]
async fn test_retry_on_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tags"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec!["a", "b"]))
        .mount(&mock_server)
        .await;

    let items = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .retry_strategy(RetryStrategy::Linear {
            delay: Duration::from_millis(10),
            max_retries: 3,
        })
        .build()
        .unwrap()
        .service(items_contract());

    let tags: Vec<String> = items.call("tags").send().await.unwrap();
    assert_eq!(tags, vec!["a", "b"]);
}

async fn mount_page(server: &MockServer, page: u32, items: Vec<Item>, link: &str) {
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", page.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-total-count", "5")
                .insert_header("link", link)
                .set_body_json(items),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_link_paged_navigation() {
    let mock_server = MockServer::start().await;
    let first = r#"</items?page=1&pageSize=2>; rel="first""#;
    let last = r#"</items?page=3&pageSize=2>; rel="last""#;

    mount_page(
        &mock_server,
        1,
        vec![item(1, "a"), item(2, "b")],
        &format!(r#"{}, </items?page=2&pageSize=2>; rel="next", {}"#, first, last),
    )
    .await;
    mount_page(
        &mock_server,
        2,
        vec![item(3, "c"), item(4, "d")],
        &format!(
            r#"{}, </items?page=1&pageSize=2>; rel="prev", </items?page=3&pageSize=2>; rel="next", {}"#,
            first, last
        ),
    )
    .await;
    mount_page(
        &mock_server,
        3,
        vec![item(5, "e")],
        &format!(r#"{}, </items?page=2&pageSize=2>; rel="prev", {}"#, first, last),
    )
    .await;

    let cancel = CancellationToken::new();
    let page: LinkedPage<Item> = service(&mock_server)
        .call("list_items")
        .arg(1u32)
        .arg(2u32)
        .send()
        .await
        .unwrap();

    assert_eq!(page.page(), 1);
    assert_eq!(page.page_size(), 2);
    assert_eq!(page.total_count(), 5);
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_next_page() && !page.has_previous_page());

    let second = page.get_next(&cancel).await.unwrap().unwrap();
    assert_eq!(second.page(), 2);
    assert_eq!(second.items(), &[item(3, "c"), item(4, "d")]);

    let third = second.get_page(3, &cancel).await.unwrap().unwrap();
    assert_eq!(third.page(), 3);
    assert!(!third.has_next_page());
    assert!(third.get_next(&cancel).await.unwrap().is_none());

    let back = third.reset(&cancel).await.unwrap().unwrap();
    assert_eq!(back.page(), 1);
    assert_eq!(back.items().len(), 2);
}

#[tokio::test]
async fn test_sorting_rewrites_and_clears_sort_parameter() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sorted"))
        .and(query_param("sort", "name"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![item(1, "a"), item(2, "b")]))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sorted"))
        .and(query_param("sort", "name:desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![item(2, "b"), item(1, "a")]))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sorted"))
        .and(query_param_is_missing("sort"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![item(2, "b"), item(1, "a")]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let cancel = CancellationToken::new();
    let list: SortedList<Item> = service(&mock_server)
        .call("sorted_items")
        .arg("name")
        .send()
        .await
        .unwrap();
    assert_eq!(list.sorts(), &[SortDescriptor::ascending("name")]);

    let descending = list
        .sort(&[SortDescriptor::descending("name")], &cancel)
        .await
        .unwrap();
    assert_eq!(descending.sorts(), &[SortDescriptor::descending("name")]);
    assert_eq!(descending.items()[0].id, 2);

    let unsorted = descending.sort(&[], &cancel).await.unwrap();
    assert!(unsorted.sorts().is_empty());
    assert!(unsorted.request_url().query_pairs().all(|(k, _)| k != "sort"));
}
