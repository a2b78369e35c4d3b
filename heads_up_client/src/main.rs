use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use heads_up_core::{ActionRequest, ClientMessage, GameId, PlayerId, ServerEvent};

const USAGE: &str = "用法: heads_up_client <游戏ID> <玩家ID> [服务器地址，默认 127.0.0.1:25917]";

/// 一行用户输入解析出来的结果
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(ClientMessage),
    Exit,
}

fn parse_command(line: &str, player_id: PlayerId) -> Result<Command, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let act = |action: &str, amount: Option<u32>| {
        Command::Send(ClientMessage::Act(ActionRequest { player_id, action: action.to_string(), amount }))
    };

    match parts.as_slice() {
        ["deal"] => Ok(Command::Send(ClientMessage::Deal)),
        ["next"] => Ok(Command::Send(ClientMessage::NextHand)),
        ["fold"] => Ok(act("fold", None)),
        // 无需跟注时跟注就是过牌
        ["call"] | ["check"] => Ok(act("call", None)),
        ["raise", amount] => amount
            .parse()
            .map(|amount| act("raise", Some(amount)))
            .map_err(|_| format!("无效的金额: {amount}")),
        ["raise"] => Err("用法: raise <加注后的总额>".to_string()),
        ["exit"] | ["quit"] => Ok(Command::Exit),
        _ => Err(format!("未知命令: {}", line.trim())),
    }
}

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::KeepAlive { .. } => return,
        ServerEvent::Error { kind, reason, .. } => println!("\n<-- [错误 {kind}]: {reason}\n"),
        other => println!("\n<-- [服务器消息]:\n{:#?}\n", other),
    }
    print!("> "); // 重新显示输入提示符
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (Some(game_id), Some(player_id)) = (args.first(), args.get(1)) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let game_id: GameId = game_id.parse()?;
    let player_id: PlayerId = player_id.parse()?;
    let addr = args.get(2).map_or("127.0.0.1:25917", String::as_str);
    let url = Url::parse(&format!("ws://{addr}/games/{game_id}/ws"))?;

    println!("正在连接到: {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();

    // 启动一个任务来处理从服务器接收的消息
    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(text.as_str()) {
                    Ok(event) => print_event(&event),
                    Err(e) => eprintln!("解析服务器消息失败: {}", e),
                },
                Ok(Message::Close(_)) => {
                    println!("\n服务器关闭了连接");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            }
        }
    });

    // 主任务处理用户输入
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("--- 单挑德州扑克客户端 ---");
    println!("玩家: {}", player_id);
    println!("可用命令:");
    println!("  deal                      - 发第一手牌");
    println!("  next                      - 开始下一手");
    println!("  fold                      - 弃牌");
    println!("  call / check              - 跟注或过牌");
    println!("  raise <金额>              - 加注到指定总额");
    println!("  exit                      - 退出");

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = stdin.next_line().await? else { break };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line, player_id) {
            Ok(Command::Send(msg)) => {
                let payload = serde_json::to_string(&msg)?;
                write.send(Message::Text(payload.into())).await?;
            }
            Ok(Command::Exit) => break,
            Err(message) => println!("{message}"),
        }
    }

    println!("正在断开连接...");
    let _ = write.send(Message::Close(None)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_parse_commands() {
        let me = Uuid::new_v4();
        assert_eq!(parse_command("deal", me), Ok(Command::Send(ClientMessage::Deal)));
        assert_eq!(parse_command(" next ", me), Ok(Command::Send(ClientMessage::NextHand)));
        assert_eq!(parse_command("exit", me), Ok(Command::Exit));
        assert_eq!(
            parse_command("raise 80", me),
            Ok(Command::Send(ClientMessage::Act(ActionRequest {
                player_id: me,
                action: "raise".to_string(),
                amount: Some(80),
            })))
        );
        assert_eq!(
            parse_command("check", me),
            parse_command("call", me)
        );
        assert!(parse_command("raise lots", me).is_err());
        assert!(parse_command("raise", me).is_err());
        assert!(parse_command("shove", me).is_err());
    }
}
