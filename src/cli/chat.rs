//! Interactive chat loop
//!
//! Line-oriented presentation adapter over the conversation engine and the
//! store. Exactly one turn is in flight at a time; input is not read again
//! until the current turn reaches a terminal event.

use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::core::article::ArticleIndex;
use crate::core::chat_stream::HttpChatTransport;
use crate::core::config::Config;
use crate::core::engine::{ChatEngine, TurnEvent};
use crate::core::prompt::ASSISTANT_NAME;
use crate::core::store::ConversationStore;

pub async fn run(
    model_override: Option<&str>,
    launch_prompt: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let api_key = config.resolve_api_key();
    let base_url = config.resolve_base_url();
    let model = config.resolve_model(model_override);
    debug!(%base_url, %model, "Starting chat session");

    let transport = Arc::new(HttpChatTransport::new(
        base_url,
        api_key.clone().unwrap_or_default(),
    ));
    let index = Arc::new(ArticleIndex::bundled());
    let engine = ChatEngine::new(transport, index.clone(), model, api_key.is_some());

    let mut store = ConversationStore::load(config.resolve_data_file())?;
    if let Some(seed) = launch_prompt {
        store.create_project(Some(seed))?;
        run_turn(&engine, &mut store, seed).await?;
    } else if store.is_empty() {
        store.create_project(None)?;
    } else {
        let most_recent = store.sorted_projects()[0].id.clone();
        store.set_active(&most_recent);
    }

    println!("{ASSISTANT_NAME} — ask about districts, news, or culture. /quit to exit.");
    if let Some(hint) = index.hints().first() {
        println!("Try: {hint}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(&engine, &mut store, command).await? {
                break;
            }
            continue;
        }

        if store.active_project().is_none() {
            // No active conversation: the message seeds a new one, titling it.
            store.create_project(Some(&line))?;
        }
        run_turn(&engine, &mut store, &line).await?;
    }

    Ok(())
}

/// Returns false when the loop should exit.
async fn handle_command(
    engine: &ChatEngine,
    store: &mut ConversationStore,
    command: &str,
) -> Result<bool, Box<dyn Error>> {
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "quit" | "exit" => return Ok(false),
        "new" => {
            let seed = (!rest.is_empty()).then_some(rest);
            store.create_project(seed)?;
            if let Some(seed) = seed {
                run_turn(engine, store, seed).await?;
            } else {
                println!("Started a new conversation.");
            }
        }
        "list" => {
            let active = store.active_project_id().map(str::to_string);
            for (position, project) in store.sorted_projects().iter().enumerate() {
                let marker = if active.as_deref() == Some(&project.id) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}. {}", position + 1, project.title);
            }
        }
        "switch" => match project_at(store, rest) {
            Some(id) => {
                store.set_active(&id);
                println!("Switched.");
            }
            None => println!("Usage: /switch <n> (see /list)"),
        },
        "delete" => match project_at(store, rest) {
            Some(id) => {
                store.delete_project(&id)?;
                println!("Deleted.");
            }
            None => println!("Usage: /delete <n> (see /list)"),
        },
        _ => println!("Unknown command: /{name}"),
    }
    Ok(true)
}

fn project_at(store: &ConversationStore, position: &str) -> Option<String> {
    let position: usize = position.parse().ok()?;
    store
        .sorted_projects()
        .get(position.checked_sub(1)?)
        .map(|p| p.id.clone())
}

/// Drive one turn: append the user message, stream the model response into
/// the store, and render fragments as they arrive.
async fn run_turn(
    engine: &ChatEngine,
    store: &mut ConversationStore,
    text: &str,
) -> Result<(), Box<dyn Error>> {
    let project_id = store
        .active_project_id()
        .ok_or("no active conversation")?
        .to_string();
    let history = store
        .project(&project_id)
        .map(|p| p.messages.clone())
        .unwrap_or_default();

    store.append_user_message(&project_id, text)?;
    let message_id = store.begin_model_message(&project_id)?;

    let mut handle = engine.submit(&history, text);
    print!("{ASSISTANT_NAME}: ");
    std::io::stdout().flush()?;

    while let Some(event) = handle.events.recv().await {
        match event {
            TurnEvent::Delta {
                text: fragment,
                sources,
            } => {
                print!("{fragment}");
                std::io::stdout().flush()?;
                store.apply_model_delta(&project_id, message_id, &fragment, &sources)?;
            }
            TurnEvent::Done => break,
            TurnEvent::Cancelled => {
                println!("(cancelled)");
                return Ok(());
            }
            TurnEvent::Failed(error) => {
                // One terminal fragment; anything already streamed stays.
                let fragment = error.to_string();
                println!("{fragment}");
                store.apply_model_delta(&project_id, message_id, &fragment, &[])?;
                return Ok(());
            }
        }
    }
    println!();

    let sources = store
        .project(&project_id)
        .and_then(|p| p.messages.iter().find(|m| m.id == message_id))
        .and_then(|m| m.sources.clone());
    if let Some(sources) = sources {
        println!("Sources:");
        for source in sources {
            let title = if source.title.is_empty() {
                "Source"
            } else {
                source.title.as_str()
            };
            println!("  {title} <{}>", source.uri);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatRequest;
    use crate::core::chat_stream::{ChatTransport, StreamMessage};
    use crate::core::store::Role;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    /// Replays the same message sequence for every opened stream and counts
    /// how many streams were opened.
    struct ScriptedTransport {
        script: Vec<StreamMessage>,
        opened: Mutex<usize>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<StreamMessage>) -> Arc<Self> {
            Arc::new(Self {
                script,
                opened: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn open(
            &self,
            _request: ChatRequest,
            _cancel: CancellationToken,
        ) -> mpsc::UnboundedReceiver<StreamMessage> {
            *self.opened.lock().unwrap() += 1;
            let (tx, rx) = mpsc::unbounded_channel();
            for message in self.script.clone() {
                let _ = tx.send(message);
            }
            rx
        }
    }

    fn engine_over(transport: Arc<ScriptedTransport>) -> ChatEngine {
        ChatEngine::new(
            transport,
            Arc::new(ArticleIndex::bundled()),
            "test-model",
            true,
        )
    }

    #[tokio::test]
    async fn seeded_project_gets_an_immediate_first_turn() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("projects.json");
        let mut store = ConversationStore::load(path.clone()).unwrap();
        let transport = ScriptedTransport::new(vec![
            StreamMessage::Chunk("Puri is famous for ".to_string()),
            StreamMessage::Chunk("the Jagannath Temple.".to_string()),
            StreamMessage::End,
        ]);
        let engine = engine_over(Arc::clone(&transport));

        let seed = "Tell me about Puri";
        store.create_project(Some(seed)).unwrap();
        run_turn(&engine, &mut store, seed).await.unwrap();

        let project = store.active_project().expect("active project");
        assert_eq!(project.title, "Tell me about Puri");
        assert_eq!(project.messages.len(), 2);
        assert_eq!(project.messages[0].role, Role::User);
        assert_eq!(project.messages[0].text, seed);
        assert_eq!(project.messages[1].role, Role::Model);
        assert_eq!(
            project.messages[1].text,
            "Puri is famous for the Jagannath Temple."
        );
        assert_eq!(*transport.opened.lock().unwrap(), 1);

        // Every streamed delta went through the store's persist path.
        let reloaded = ConversationStore::load(path).unwrap();
        let persisted = reloaded.sorted_projects()[0];
        assert_eq!(persisted.messages.len(), 2);
        assert_eq!(
            persisted.messages[1].text,
            "Puri is famous for the Jagannath Temple."
        );
    }

    #[tokio::test]
    async fn failed_turn_leaves_one_terminal_fragment_in_the_store() {
        let dir = TempDir::new().unwrap();
        let mut store =
            ConversationStore::load(dir.path().join("projects.json")).unwrap();
        let transport = ScriptedTransport::new(vec![
            StreamMessage::Chunk("partial".to_string()),
            StreamMessage::Error("API Error: boom".to_string()),
            StreamMessage::End,
        ]);
        let engine = engine_over(transport);

        store.create_project(Some("news?")).unwrap();
        run_turn(&engine, &mut store, "news?").await.unwrap();

        let project = store.active_project().expect("active project");
        assert_eq!(project.messages[1].text, "partialAPI Error: boom");
    }
}
