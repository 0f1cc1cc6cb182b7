//! Built-in content: the default question bank, study syllabi, the optional JSON
//! bank loader and admin bootstrap. Guarantees a usable app without external files.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::hash_password_async;
use crate::config::AdminBootstrap;
use crate::domain::{Difficulty, Question, Role, User, UserStats};
use crate::store::{DynStore, StoreError};
use crate::util::normalize_email;

struct SeedCategory {
  id: &'static str,
  name: &'static str,
  description: &'static str,
  syllabus: [&'static str; 5],
  // (difficulty, question, options, correct index, explanation)
  questions: [(i64, &'static str, [&'static str; 4], usize, &'static str); 5],
}

static BANK: [SeedCategory; 4] = [
  SeedCategory {
    id: "basic-phishing",
    name: "Basic Phishing",
    description: "Spot everyday phishing emails, links and attachments.",
    syllabus: [
      "Definition and mechanics of phishing attacks",
      "Identifying suspicious URLs and subdomains",
      "Recognizing urgency and emotional manipulation",
      "Safe handling of email attachments (.exe, .scr)",
      "Verifying sender identity (header analysis)",
    ],
    questions: [
      (1, "An email says your account is locked and asks you to log in through a link. What should you do first?",
        ["Click the link and log in", "Open the site by typing its address yourself", "Reply with your password", "Forward it to colleagues"],
        1, "Navigating to the site yourself avoids a spoofed login page."),
      (2, "Which URL is most likely a phishing link for paypal.com?",
        ["https://www.paypal.com/signin", "https://paypal.com/help", "https://paypa1-secure.com/login", "https://www.paypal.com/myaccount"],
        2, "The digit 1 replaces the letter l and the domain is not paypal.com."),
      (3, "An unexpected invoice arrives as 'invoice.pdf.exe'. What is the safest assumption?",
        ["It is a PDF", "It is an executable disguised as a document", "It is a harmless archive", "It is a signed invoice"],
        1, "The final extension decides the file type; .exe runs code."),
      (4, "Which phrase is the strongest urgency red flag?",
        ["Thanks for your order", "Your account will be suspended within 24 hours", "Monthly newsletter", "Meeting notes attached"],
        1, "Artificial deadlines push victims to act before thinking."),
      (5, "The display name says 'IT Support' but the Return-Path is an unrelated free-mail domain. What does this suggest?",
        ["Normal forwarding", "A likely spoofed sender", "A mailing list", "An encrypted message"],
        1, "Mismatched headers are a classic sign the sender identity is forged."),
    ],
  },
  SeedCategory {
    id: "advanced-phishing",
    name: "Advanced Phishing",
    description: "Targeted phishing, email authentication and modern phishing kits.",
    syllabus: [
      "Spear phishing vs. whaling vs. clone phishing",
      "Technical defenses: SPF, DKIM and DMARC",
      "Homograph attacks (ASCII/Cyrillic spoofing)",
      "Man-in-the-middle phishing proxies",
      "Bypassing 2FA using real-time phishing kits",
    ],
    questions: [
      (1, "A phishing email aimed specifically at the company CEO is called:",
        ["Vishing", "Whaling", "Smishing", "Baiting"],
        1, "Whaling targets senior executives."),
      (2, "Which record lets a domain publish which servers may send its mail?",
        ["SPF", "MX", "CNAME", "PTR"],
        0, "SPF lists authorised sending hosts for a domain."),
      (3, "A link shows 'apple.com' but uses a Cyrillic 'а'. This is a:",
        ["Typosquat", "Homograph attack", "Open redirect", "DNS rebinding"],
        1, "Look-alike Unicode characters make a different domain appear identical."),
      (4, "A clone phishing email usually:",
        ["Copies a legitimate email you received and swaps a link", "Arrives by SMS", "Contains no links", "Targets only executives"],
        0, "Clone phishing reuses a real message so it looks familiar."),
      (5, "Why can a reverse-proxy phishing kit defeat one-time SMS codes?",
        ["It guesses the code", "It relays the code and steals the session cookie in real time", "It disables SMS", "It cracks the password hash"],
        1, "The proxy forwards credentials and codes live, then captures the authenticated session."),
    ],
  },
  SeedCategory {
    id: "social-engineering",
    name: "Social Engineering",
    description: "Manipulation tactics used in person, by phone and by message.",
    syllabus: [
      "The psychology of manipulation (Cialdini's principles)",
      "Pretexting: creating a fabricated scenario",
      "Baiting and quid pro quo attacks",
      "Physical social engineering (tailgating)",
      "Vishing (voice) and smishing (SMS) techniques",
    ],
    questions: [
      (1, "Someone without a badge follows you through a secured door. This is:",
        ["Tailgating", "Phishing", "Shoulder surfing", "Dumpster diving"],
        0, "Tailgating exploits politeness to bypass physical access control."),
      (2, "A caller claims to be from the bank and asks you to read back a code just sent to you. This is:",
        ["A routine check", "Vishing", "Baiting", "A software update"],
        1, "Banks never ask for one-time codes; voice phishing relies on trust in the caller."),
      (3, "A USB stick labelled 'Salaries 2024' is left in the car park. The attack is called:",
        ["Baiting", "Whaling", "Pharming", "Pretexting"],
        0, "Baiting uses curiosity to make victims plug in malicious media."),
      (4, "An attacker invents a story about an audit to obtain employee records. This is:",
        ["Quid pro quo", "Pretexting", "Tailgating", "Smishing"],
        1, "Pretexting builds a fabricated scenario to justify the request."),
      (5, "Which of Cialdini's principles does 'Only 3 seats left, offer ends tonight' exploit?",
        ["Reciprocity", "Scarcity", "Consistency", "Liking"],
        1, "Scarcity makes opportunities seem more valuable when limited."),
    ],
  },
  SeedCategory {
    id: "email-security",
    name: "Email Security",
    description: "Protecting accounts and mail: passwords, MFA and encryption.",
    syllabus: [
      "Password hygiene and entropy",
      "Multi-factor authentication (MFA/2FA) types",
      "End-to-end encryption (PGP/GPG, S/MIME)",
      "Recognizing business email compromise (BEC)",
      "Secure email gateway configurations",
    ],
    questions: [
      (1, "Which password is strongest?",
        ["Password123", "Summer2024!", "correct-horse-battery-staple-91", "qwerty"],
        2, "Length dominates entropy; a long passphrase beats short complex words."),
      (2, "Which second factor resists phishing best?",
        ["SMS code", "Email code", "FIDO2 security key", "Security question"],
        2, "Hardware keys bind to the real origin so phished sites cannot use them."),
      (3, "End-to-end email encryption ensures that:",
        ["Only the recipient can read the content", "Mail is never spam", "Attachments are scanned", "The sender is always verified"],
        0, "Only the recipient's private key can decrypt the message."),
      (4, "A 'CEO' emails finance asking for an urgent wire to a new supplier. The likely attack is:",
        ["Ransomware", "Business email compromise", "DDoS", "Credential stuffing"],
        1, "BEC impersonates executives to redirect payments."),
      (5, "A DMARC policy of p=reject tells receivers to:",
        ["Deliver everything", "Reject mail failing SPF/DKIM alignment", "Quarantine newsletters", "Encrypt all mail"],
        1, "p=reject instructs receivers to refuse unauthenticated mail for the domain."),
    ],
  },
];

/// The built-in bank as domain questions (fresh ids on every call).
pub fn builtin_questions() -> Vec<Question> {
  let now = Utc::now();
  BANK
    .iter()
    .flat_map(|cat| {
      cat.questions.iter().map(move |(level, text, options, correct, explanation)| Question {
        id: Uuid::new_v4().to_string(),
        external_id: format!("seed-{}-{}", cat.id, level),
        category_id: cat.id.to_string(),
        category_name: cat.name.to_string(),
        difficulty: Difficulty::new(*level),
        text: text.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct_index: *correct,
        explanation: explanation.to_string(),
        created_at: now,
      })
    })
    .collect()
}

/// Category descriptions known at startup.
pub fn builtin_descriptions() -> HashMap<String, String> {
  BANK.iter().map(|c| (c.id.to_string(), c.description.to_string())).collect()
}

/// Module order of the learning path, as `(category id, name)`.
pub fn learning_path() -> Vec<(&'static str, &'static str)> {
  BANK.iter().map(|c| (c.id, c.name)).collect()
}

/// Topic outline for a category, used when notes cannot be generated.
pub fn syllabus(category_id: &str) -> Option<&'static [&'static str]> {
  BANK.iter().find(|c| c.id == category_id).map(|c| &c.syllabus[..])
}

// --- JSON bank ---

#[derive(Debug, Deserialize)]
pub struct BankFile {
  pub categories: Vec<BankCategory>,
}

#[derive(Debug, Deserialize)]
pub struct BankCategory {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub questions: Vec<BankQuestion>,
}

#[derive(Debug, Deserialize)]
pub struct BankQuestion {
  pub id: serde_json::Value,
  pub difficulty: i64,
  pub question: String,
  pub options: Vec<String>,
  pub correct_answer: usize,
  #[serde(default)]
  pub explanation: String,
}

/// Convert a parsed bank into questions plus category descriptions.
/// Invalid entries are skipped with a warning.
pub fn questions_from_bank(bank: BankFile) -> (Vec<Question>, HashMap<String, String>) {
  let now = Utc::now();
  let mut out = Vec::new();
  let mut descriptions = HashMap::new();
  for cat in bank.categories {
    if let Some(d) = cat.description.filter(|d| !d.trim().is_empty()) {
      descriptions.insert(cat.id.clone(), d);
    }
    for bq in cat.questions {
      let raw_id = match &bq.id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      let q = Question {
        id: Uuid::new_v4().to_string(),
        external_id: format!("{}-{}", cat.id, raw_id),
        category_id: cat.id.clone(),
        category_name: cat.name.clone(),
        difficulty: Difficulty::from_ten_point(bq.difficulty),
        text: bq.question,
        options: bq.options,
        correct_index: bq.correct_answer,
        explanation: bq.explanation,
        created_at: now,
      };
      match q.validate() {
        Ok(()) => out.push(q),
        Err(reason) => warn!(target: "cyberlms_backend", external_id = %q.external_id, %reason, "Skipping invalid bank question"),
      }
    }
  }
  (out, descriptions)
}

pub fn load_question_bank(path: &str) -> Result<(Vec<Question>, HashMap<String, String>), String> {
  let raw = std::fs::read_to_string(path).map_err(|e| format!("read {path}: {e}"))?;
  let bank: BankFile = serde_json::from_str(&raw).map_err(|e| format!("parse {path}: {e}"))?;
  Ok(questions_from_bank(bank))
}

/// Insert questions, treating an existing external id as already seeded.
#[instrument(level = "info", skip(store, questions), fields(count = questions.len()))]
pub async fn seed_questions(store: &DynStore, questions: &[Question]) -> Result<usize, StoreError> {
  let mut inserted = 0;
  for q in questions {
    match store.insert_question(q).await {
      Ok(()) => inserted += 1,
      Err(StoreError::Conflict(_)) => {}
      Err(e) => return Err(e),
    }
  }
  info!(target: "cyberlms_backend", inserted, skipped = questions.len() - inserted, "Question bank seeded");
  Ok(inserted)
}

/// Create the configured admin account unless that email is already taken.
#[instrument(level = "info", skip_all)]
pub async fn bootstrap_admin(store: &DynStore, admin: &AdminBootstrap, bcrypt_cost: u32) -> Result<bool, String> {
  let email = normalize_email(&admin.email);
  if store.find_user_by_email(&email).await.map_err(|e| e.to_string())?.is_some() {
    return Ok(false);
  }
  let hash = hash_password_async(admin.password.clone(), bcrypt_cost).await.map_err(|e| e.to_string())?;
  let now = Utc::now();
  let user = User {
    id: Uuid::new_v4().to_string(),
    name: "Administrator".into(),
    email: email.clone(),
    password_hash: hash,
    role: Role::Admin,
    stats: UserStats::default(),
    created_at: now,
    updated_at: now,
  };
  store.insert_user(&user).await.map_err(|e| e.to_string())?;
  info!(target: "auth", %email, "Bootstrap admin created");
  Ok(true)
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;
  use std::sync::Arc;

  use super::*;
  use crate::store::{MemoryStore, QuestionFilter};

  #[test]
  fn builtin_bank_covers_every_level_per_category() {
    let qs = builtin_questions();
    let cats: HashSet<&str> = qs.iter().map(|q| q.category_id.as_str()).collect();
    assert_eq!(cats.len(), 4);
    for cat in cats {
      let levels: HashSet<u8> = qs.iter().filter(|q| q.category_id == cat).map(|q| q.difficulty.value()).collect();
      assert_eq!(levels, (1..=5).collect::<HashSet<u8>>(), "category {cat}");
    }
    assert!(qs.iter().all(|q| q.validate().is_ok()));
  }

  #[test]
  fn learning_path_runs_basic_to_email_security() {
    let ids: Vec<&str> = learning_path().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, ["basic-phishing", "advanced-phishing", "social-engineering", "email-security"]);
    assert!(ids.iter().all(|id| syllabus(id).is_some()));
  }

  #[test]
  fn bank_file_scales_difficulty_and_skips_bad_rows() {
    let raw = r#"{
      "categories": [{
        "id": "malware",
        "name": "Malware",
        "description": "Viruses and worms",
        "questions": [
          {"id": 1, "difficulty": 10, "question": "Worm?", "options": ["a", "b"], "correct_answer": 1, "explanation": "x"},
          {"id": 2, "difficulty": 3, "question": "Bad", "options": ["a", "b"], "correct_answer": 7}
        ]
      }]
    }"#;
    let bank: BankFile = serde_json::from_str(raw).expect("bank");
    let (qs, descriptions) = questions_from_bank(bank);
    assert_eq!(qs.len(), 1);
    assert_eq!(qs[0].difficulty, Difficulty::MAX);
    assert_eq!(qs[0].external_id, "malware-1");
    assert_eq!(descriptions.get("malware").map(String::as_str), Some("Viruses and worms"));
  }

  #[tokio::test]
  async fn seeding_twice_is_idempotent() {
    let store: DynStore = Arc::new(MemoryStore::new());
    let qs = builtin_questions();
    assert_eq!(seed_questions(&store, &qs).await.expect("seed"), 20);
    assert_eq!(seed_questions(&store, &builtin_questions()).await.expect("reseed"), 0);
    assert_eq!(store.list_questions(&QuestionFilter::default()).await.unwrap().len(), 20);
  }

  #[tokio::test]
  async fn admin_bootstrap_runs_once() {
    let store: DynStore = Arc::new(MemoryStore::new());
    let admin = AdminBootstrap { email: " Root@Example.com ".into(), password: "s3cret!".into() };
    assert!(bootstrap_admin(&store, &admin, 4).await.expect("first"));
    assert!(!bootstrap_admin(&store, &admin, 4).await.expect("second"));
    let u = store.find_user_by_email("root@example.com").await.unwrap().expect("admin");
    assert_eq!(u.role, Role::Admin);
  }
}
