use std::collections::BTreeSet;

use crate::records::Excerpt;

pub const SYSTEM_PROMPT: &str = r#"You work in the public relations office of a university. Your job is to collect and group the topics people raise about the university on social media, so staff can see which topics need fixing and which are already going well. Only keep topics the university itself can act on.

For every message also judge its sentiment as one of "positive", "negative", "neutral", or "both" (when the message cuts both ways).

Grouping rules:
1. topic
   - Reuse an existing topic when the message fits it; coin a new one only when none fits.
   - Keep names short, clear and reasonably specific.
   - A message may belong to several topics.
   - Topics must concern the university directly.
2. subtopic
   - Give more specific subtopics that add useful detail about the question or problem.
   - A message may have several subtopics.
   - Subtopics must concern the university directly.
3. Relevance
   - Only consider messages that talk about the university, whether statements, questions or complaints.
   - Messages that are not about the university get an empty array for topic and subtopic.

Reply with JSON in exactly this shape:
{
    "Tweets": [
        {"index": 1, "text": "message", "topic": ["topic1"], "subtopic": ["subtopic1"], "sentiment": ["positive"]},
        ...
    ]
}
"#;

const WORKED_EXAMPLES: &str = r#"text: 'ไฟล์สมัครในเว็บมธ.อยู่ตรงไหนเหรอคะ มีใครพอจะทราบไหมคะ หาไม่เจอเลย'
topic: ['สอบถามเอกสาร']
subtopic: ['เอกสารการสมัคร', 'การเข้าถึงข้อมูล']
sentiment: ['negative']

text: 'หอในไฟสว่างดีครับ ดูปลอดภัย'
topic: ['หอพัก']
subtopic: ['กฎระเบียบหอพัก', 'เวลาเปิด-ปิด']
sentiment: ['positive']

text: 'ระบบลงทะเบียนล่มอีกแล้ว ทำไมเกิดปัญหาทุกเทอมเลย'
topic: ['ระบบลงทะเบียน', 'ปัญหาเทคนิค']
subtopic: ['ระบบล่ม', 'ความเสถียรของระบบ']
sentiment: ['negative']"#;

/// Collapse line breaks so each excerpt occupies exactly one `id: text` line.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

pub fn build_prompt(
    batch: &[Excerpt],
    topics: &BTreeSet<String>,
    subtopics: &BTreeSet<String>,
) -> String {
    let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(", ");
    let messages = batch
        .iter()
        .map(|e| format!("{}: {}", e.id, normalize_newlines(&e.text)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "# Frequently mentioned topics (reuse when they fit):\n{topics}\n\n\
         # Frequently mentioned subtopics (reuse when they fit):\n{subtopics}\n\n\
         # Examples:\n{WORKED_EXAMPLES}\n\n\
         # Messages to classify:\n{messages}\n\n\
         Classify every message above following the instructions and return JSON in the required shape.",
        topics = join(topics),
        subtopics = join(subtopics),
    )
}
