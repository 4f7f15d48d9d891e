use iocraft::prelude::*;

use file_relay::error::megabytes;
use file_relay::plan::ChunkRange;

#[derive(Default, Props)]
pub struct ProbeReportProps {
    pub url: String,
    pub file_name: String,
    pub total_bytes: u64,
    pub content_type: Option<String>,
    pub parts: Vec<ChunkRange>,
    pub merge_instructions: Option<String>,
}

#[component]
pub fn ProbeReport(props: &ProbeReportProps) -> impl Into<AnyElement<'static>> {
    let mode = if props.parts.is_empty() {
        "single file".to_string()
    } else {
        format!("{} parts", props.parts.len())
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "┌ ")
                View(background_color: Color::Blue) {
                    Text(content: &props.file_name, color: Color::White)
                }
            }
            Text(content: format!("│ {}", props.url))
            Text(content: format!("│ size: {} MB ({} bytes)", megabytes(&props.total_bytes), props.total_bytes))
            #(props.content_type.as_ref().map(|content_type| element! {
                Text(content: format!("│ type: {}", content_type))
            }))
            Text(content: format!("│ mode: {}", mode))
            #(props.parts.iter().map(|part| element! {
                View(flex_direction: FlexDirection::Row) {
                    Text(content: "│   ")
                    Text(weight: Weight::Bold, content: part.name.clone())
                    Text(content: format!(" bytes={}-{}", part.start, part.end))
                }
            }))
            Text(content: "└")
            #(props.merge_instructions.as_ref().map(|text| element! {
                Text(content: text.clone())
            }))
        }
    }
}

#[derive(Default, Props)]
pub struct ErrorMessageProps {
    pub message: String,
}

#[component]
pub fn ErrorMessage(props: &ErrorMessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Red, content: "▲ ")
            Text(content: &props.message)
        }
    }
}
