//! The HTTP client against a live server on an ephemeral port.

mod common;

use rstest::rstest;
use tokio::net::TcpListener;

use taskmate::client::{ApiClient, Reply};
use taskmate::kanban_board::{KanbanBoard, StatusFilter};
use taskmate::task::{NewTask, TaskPatch, TaskStatus};

use common::{app, test_state};

async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let router = app(&test_state());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{address}")
}

#[rstest]
#[tokio::test]
async fn full_task_lifecycle_through_the_client() {
    let base = spawn_server().await;
    let anonymous = ApiClient::new(&base);

    let auth = anonymous
        .register("ada", "ada@example.com", "pw")
        .await
        .unwrap()
        .into_result()
        .unwrap();
    let client = anonymous.clone().with_token(auth.token);

    let created = client
        .create_task(&NewTask::titled("Buy milk"))
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(created.status, TaskStatus::Pending);

    let toggled = client
        .update_task_status(created.id, created.status.next())
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(toggled.status, TaskStatus::Working);

    let renamed = client
        .update_task(
            created.id,
            &TaskPatch {
                title: Some("Buy oat milk".to_string()),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(renamed.title, "Buy oat milk");
    assert_eq!(renamed.status, TaskStatus::Working);

    let message = client.delete_task(created.id).await.unwrap();
    assert_eq!(message, "Task deleted successfully");

    let remaining = client.fetch_tasks().await.unwrap().into_result().unwrap();
    assert!(remaining.iter().all(|t| t.id != created.id));
}

#[rstest]
#[tokio::test]
async fn error_bodies_come_back_as_messages() {
    let base = spawn_server().await;
    let anonymous = ApiClient::new(&base);

    let reply = anonymous.fetch_tasks().await.unwrap();
    assert_eq!(reply, Reply::Message("Not authorized, no token".to_string()));

    let login = anonymous.login("nobody@example.com", "pw").await.unwrap();
    assert_eq!(login, Reply::Message("Invalid credentials".to_string()));

    let auth = anonymous
        .register("ada", "ada@example.com", "pw")
        .await
        .unwrap()
        .into_result()
        .unwrap();
    let client = anonymous.with_token(auth.token);
    let reply = client.create_task(&NewTask::default()).await.unwrap();
    assert_eq!(reply, Reply::Message("Task title is required".to_string()));
}

#[rstest]
#[tokio::test]
async fn board_views_fetched_tasks() {
    let base = spawn_server().await;
    let anonymous = ApiClient::new(&base);
    let auth = anonymous
        .register("ada", "ada@example.com", "pw")
        .await
        .unwrap()
        .into_result()
        .unwrap();
    let client = anonymous.with_token(auth.token);

    for (title, description) in [("Groceries", "milk and eggs"), ("Gym", "leg day"), ("Call mum", "")] {
        client
            .create_task(&NewTask {
                title: Some(title.to_string()),
                description: Some(description.to_string()),
                ..NewTask::default()
            })
            .await
            .unwrap();
    }
    let tasks = client.fetch_tasks().await.unwrap().into_result().unwrap();
    let gym = tasks.iter().find(|t| t.title == "Gym").unwrap().id;
    client.update_task_status(gym, TaskStatus::Working).await.unwrap();

    let mut board = KanbanBoard::new();
    board.replace_all(client.fetch_tasks().await.unwrap().into_result().unwrap());
    let titles: Vec<&str> = board.visible().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Call mum", "Gym", "Groceries"]);

    board.filter = StatusFilter::Only(TaskStatus::Pending);
    board.set_query("EGG".to_string());
    let titles: Vec<&str> = board.visible().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Groceries"]);
    assert_eq!(board.stats().working, 1);
}
